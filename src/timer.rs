//! Minuteur unique, annulable et réarmable.
//!
//! `TokioTimeout` poste l'identifiant du minuteur sur une file quand il
//! expire. Le propriétaire passe chaque identifiant reçu à `TimerGate::accept`
//! avant d'agir : un déclenchement déjà en file au moment d'un `cancel` ou d'un
//! réarmement est ainsi rejeté.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub trait TimeoutScheduler {
    /// Annule le minuteur en cours puis en arme un nouveau
    fn arm(&mut self, delay: Duration);

    fn cancel(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

// 0 : aucun minuteur armé
const DISARMED: u64 = 0;

#[derive(Clone, Debug, Default)]
pub struct TimerGate {
    armed: Arc<AtomicU64>,
}

impl TimerGate {
    /// Vrai si `id` est le minuteur armé. Le consomme.
    pub fn accept(&self, id: TimerId) -> bool {
        self.armed
            .compare_exchange(id.0, DISARMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire) != DISARMED
    }
}

pub struct TokioTimeout {
    fired: UnboundedSender<TimerId>,
    gate: TimerGate,
    next_id: u64,
    pending: Option<CancellationToken>,
}

impl TokioTimeout {
    pub fn new(fired: UnboundedSender<TimerId>) -> Self {
        TokioTimeout {
            fired,
            gate: TimerGate::default(),
            next_id: DISARMED,
            pending: None,
        }
    }

    pub fn gate(&self) -> TimerGate {
        self.gate.clone()
    }
}

impl TimeoutScheduler for TokioTimeout {
    fn arm(&mut self, delay: Duration) {
        self.cancel();

        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.gate.armed.store(id.0, Ordering::Release);

        let token = CancellationToken::new();
        self.pending = Some(token.clone());

        // Échéance calculée ici, pas à la première exécution de la tâche
        let deadline = Instant::now() + delay;
        let fired = self.fired.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = fired.send(id);
                }
            }
        });
    }

    fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
        self.gate.armed.store(DISARMED, Ordering::Release);
    }
}

impl Drop for TokioTimeout {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioTimeout::new(tx);
        let gate = timer.gate();
        let started = Instant::now();

        timer.arm(Duration::from_millis(2000));
        let id = rx.recv().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(2000));
        assert!(gate.accept(id));
        assert!(!gate.accept(id));
        assert!(!gate.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioTimeout::new(tx);
        let gate = timer.gate();

        timer.arm(Duration::from_millis(2000));
        tokio::time::advance(Duration::from_millis(1500)).await;
        timer.arm(Duration::from_millis(2000));

        tokio::time::advance(Duration::from_millis(600)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(1400)).await;
        settle().await;
        let id = rx.try_recv().unwrap();
        assert!(gate.accept(id));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioTimeout::new(tx);
        let gate = timer.gate();

        timer.arm(Duration::from_millis(2000));
        timer.cancel();
        assert!(!gate.is_armed());

        tokio::time::advance(Duration::from_millis(3000)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_fire_is_rejected_after_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioTimeout::new(tx);
        let gate = timer.gate();

        timer.arm(Duration::from_millis(2000));
        tokio::time::advance(Duration::from_millis(2000)).await;
        settle().await;

        // Le déclenchement est en file, mais le propriétaire a annulé entre-temps
        timer.cancel();
        let id = rx.try_recv().unwrap();
        assert!(!gate.accept(id));
    }
}
