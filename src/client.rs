//! Client côté hôte : lecture ponctuelle et abonnements périodiques.
//!
//! Plusieurs écouteurs partagent un seul `start` sur le pont. Le client
//! garde la dernière mesure reçue, la distribue, et envoie `stop` dès que le
//! dernier écouteur disparaît.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_stream::wrappers::{IntervalStream, UnboundedReceiverStream};
use uuid::Uuid;

use crate::bridge::{BridgeHandle, Request};
use crate::config::DEFAULT_WATCH_FREQUENCY_MS;
use crate::error::ClientError;
use crate::sensors::mag::Reading;
use crate::sink::{Frame, FrameBody};

type Delivery = Result<Reading, ClientError>;

enum Listener {
    Once(oneshot::Sender<Delivery>),
    Watch {
        deliveries: mpsc::UnboundedSender<Delivery>,
        ticker: JoinHandle<()>,
    },
}

impl Listener {
    fn close(self, error: Option<ClientError>) {
        match self {
            Listener::Once(tx) => {
                let _ = tx.send(Err(error.unwrap_or(ClientError::Closed)));
            }
            Listener::Watch { deliveries, ticker } => {
                ticker.abort();
                if let Some(error) = error {
                    let _ = deliveries.send(Err(error));
                }
            }
        }
    }
}

#[derive(Default)]
struct State {
    running: bool,
    latest: Option<Reading>,
    start_callback: Option<String>,
    listeners: HashMap<Uuid, Listener>,
}

struct Inner {
    bridge: BridgeHandle,
    state: Mutex<State>,
    next_callback: AtomicU64,
    default_frequency: Duration,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callback_id(&self) -> String {
        format!("Magnetometer{}", self.next_callback.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn start(&self, state: &mut State) -> Result<(), ClientError> {
        let callback_id = self.callback_id();
        tracing::debug!("[CLIENT] start ({})", callback_id);

        self.bridge.send(Request::new(callback_id.as_str(), "start"))?;
        state.start_callback = Some(callback_id);
        state.running = true;
        Ok(())
    }

    fn stop(&self, state: &mut State) {
        tracing::debug!("[CLIENT] stop");
        if let Err(e) = self.bridge.send(Request::new(self.callback_id(), "stop")) {
            tracing::debug!("[CLIENT] Pont déjà fermé: {}", e);
        }
        state.start_callback = None;
        state.running = false;
        state.latest = None;
    }

    /// Arrête le pont quand plus personne n'écoute
    fn stop_if_idle(&self, state: &mut State) {
        if state.listeners.is_empty() && state.running {
            self.stop(state);
        }
    }

    fn on_frame(&self, frame: Frame) {
        let mut state = self.state();
        if state.start_callback.as_deref() != Some(frame.callback_id.as_str()) {
            return;
        }

        match frame.body {
            FrameBody::Ok(reading) => {
                state.latest = Some(reading);

                let once: Vec<Uuid> = state
                    .listeners
                    .iter()
                    .filter(|(_, l)| matches!(l, Listener::Once(_)))
                    .map(|(id, _)| *id)
                    .collect();

                for id in once {
                    if let Some(Listener::Once(tx)) = state.listeners.remove(&id) {
                        let _ = tx.send(Ok(reading));
                    }
                }
            }
            FrameBody::Error(payload) => {
                tracing::warn!("[CLIENT] Erreur capteur: {}", payload.message);
                state.start_callback = None;

                for (_, listener) in state.listeners.drain() {
                    listener.close(Some(ClientError::Sensor {
                        code: payload.code,
                        message: payload.message.clone(),
                    }));
                }
            }
            FrameBody::NoResult | FrameBody::InvalidAction => return,
        }

        self.stop_if_idle(&mut state);
    }
}

/// Flux d'un abonnement périodique
pub struct Watch {
    id: Uuid,
    deliveries: UnboundedReceiverStream<Delivery>,
}

impl Watch {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Stream for Watch {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.deliveries).poll_next(cx)
    }
}

pub struct Magnetometer {
    inner: Arc<Inner>,
    dispatcher: JoinHandle<()>,
}

impl Magnetometer {
    /// Branche le client sur un pont et ses trames
    pub fn new(
        bridge: BridgeHandle,
        mut frames: mpsc::UnboundedReceiver<Frame>,
        default_frequency: Duration,
    ) -> Self {
        let inner = Arc::new(Inner {
            bridge,
            state: Mutex::new(State::default()),
            next_callback: AtomicU64::new(0),
            default_frequency: non_zero(Some(default_frequency))
                .unwrap_or(Duration::from_millis(DEFAULT_WATCH_FREQUENCY_MS)),
        });

        let dispatch = Arc::downgrade(&inner);
        let dispatcher = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let Some(inner) = dispatch.upgrade() else { break };
                inner.on_frame(frame);
            }

            // Pont fermé : plus rien n'arrivera
            if let Some(inner) = dispatch.upgrade() {
                let mut state = inner.state();
                state.running = false;
                state.start_callback = None;
                for (_, listener) in state.listeners.drain() {
                    listener.close(None);
                }
            }
        });

        Magnetometer { inner, dispatcher }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state().running
    }

    /// Dernière mesure reçue depuis le dernier démarrage
    pub fn latest(&self) -> Option<Reading> {
        self.inner.state().latest
    }

    /// Attend la prochaine mesure (ou l'erreur du capteur)
    pub async fn current(&self) -> Result<Reading, ClientError> {
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.inner.state();
            if !state.running {
                self.inner.start(&mut state)?;
            }
            state.listeners.insert(Uuid::new_v4(), Listener::Once(tx));
        }

        rx.await.unwrap_or(Err(ClientError::Closed))
    }

    /// Renvoie la dernière mesure connue toutes les `frequency`.
    /// Sans fréquence, ou avec une fréquence nulle, la fréquence par défaut s'applique.
    pub fn watch(&self, frequency: Option<Duration>) -> Watch {
        let period = non_zero(frequency).unwrap_or(self.inner.default_frequency);
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let ticker = tokio::spawn(tick(Arc::downgrade(&self.inner), period, tx.clone()));

        let mut state = self.inner.state();
        if state.running {
            // Déjà démarré : on sert tout de suite la valeur en cache
            if let Some(reading) = state.latest {
                let _ = tx.send(Ok(reading));
            }
        } else if let Err(e) = self.inner.start(&mut state) {
            ticker.abort();
            let _ = tx.send(Err(e));
            return Watch {
                id,
                deliveries: UnboundedReceiverStream::new(rx),
            };
        }

        state.listeners.insert(
            id,
            Listener::Watch {
                deliveries: tx,
                ticker,
            },
        );

        Watch {
            id,
            deliveries: UnboundedReceiverStream::new(rx),
        }
    }

    pub fn clear_watch(&self, id: Uuid) {
        let mut state = self.inner.state();
        if let Some(listener) = state.listeners.remove(&id) {
            listener.close(None);
            self.inner.stop_if_idle(&mut state);
        }
    }
}

impl Drop for Magnetometer {
    fn drop(&mut self) {
        self.dispatcher.abort();

        let mut state = self.inner.state();
        for (_, listener) in state.listeners.drain() {
            listener.close(None);
        }
        if state.running {
            self.inner.stop(&mut state);
        }
    }
}

fn non_zero(frequency: Option<Duration>) -> Option<Duration> {
    frequency.filter(|f| !f.is_zero())
}

async fn tick(inner: Weak<Inner>, period: Duration, deliveries: mpsc::UnboundedSender<Delivery>) {
    let mut ticks = IntervalStream::new(interval_at(Instant::now() + period, period));

    while ticks.next().await.is_some() {
        let Some(inner) = inner.upgrade() else { break };
        let latest = inner.state().latest;

        if let Some(reading) = latest {
            if deliveries.send(Ok(reading)).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::sensors::Accuracy;
    use assert_matches::assert_matches;
    use nalgebra::Vector3;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Faux pont : on lit les requêtes et on injecte les trames à la main
    struct FakeBridge {
        requests: UnboundedReceiver<Request>,
        frames: mpsc::UnboundedSender<Frame>,
    }

    impl FakeBridge {
        fn new(default_frequency: Duration) -> (Magnetometer, FakeBridge) {
            let (frame_tx, frame_rx) = mpsc::unbounded_channel();
            let (handle, requests) = BridgeHandle::detached();

            let client = Magnetometer::new(handle, frame_rx, default_frequency);
            (
                client,
                FakeBridge {
                    requests,
                    frames: frame_tx,
                },
            )
        }

        async fn next_request(&mut self, action: &str) -> String {
            let request = self.requests.recv().await.unwrap();
            assert_eq!(request.action, action);
            request.callback_id
        }

        fn reading(&self, callback_id: &str, x: f32) {
            let reading = Reading::new(Vector3::new(x, 0.0, 0.0), Accuracy::High, 0);
            self.frames.send(Frame::ok(callback_id, reading, true)).unwrap();
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn current_starts_and_stops_around_one_reading() {
        let (client, mut bridge) = FakeBridge::new(Duration::from_secs(10));

        let pending = tokio::spawn({
            let client = Arc::new(client);
            let c = client.clone();
            async move { (c.current().await, client) }
        });

        let callback = bridge.next_request("start").await;
        bridge.reading(&callback, 5.0);

        let (result, client) = pending.await.unwrap();
        assert_matches!(result, Ok(reading) if reading.x() == 5.0);

        bridge.next_request("stop").await;
        assert!(!client.is_running());
        assert_eq!(client.latest(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_error_fails_every_listener() {
        let (client, mut bridge) = FakeBridge::new(Duration::from_secs(10));
        let mut watch = client.watch(None);

        let callback = bridge.next_request("start").await;
        bridge
            .frames
            .send(Frame::error(callback.as_str(), &MonitorError::SensorUnavailable))
            .unwrap();

        assert_matches!(
            watch.next().await,
            Some(Err(ClientError::Sensor { code: 3, .. }))
        );
        bridge.next_request("stop").await;
        assert!(!client.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_repeats_cached_reading_at_frequency() {
        let (client, mut bridge) = FakeBridge::new(Duration::from_secs(10));
        let mut watch = client.watch(Some(Duration::from_millis(100)));

        let callback = bridge.next_request("start").await;
        bridge.reading(&callback, 1.0);
        settle().await;

        let started = Instant::now();
        assert_matches!(watch.next().await, Some(Ok(r)) if r.x() == 1.0);
        assert_matches!(watch.next().await, Some(Ok(r)) if r.x() == 1.0);
        assert!(started.elapsed() <= Duration::from_millis(200));

        bridge.reading(&callback, 2.0);
        settle().await;
        assert_matches!(watch.next().await, Some(Ok(r)) if r.x() == 2.0);

        client.clear_watch(watch.id());
        bridge.next_request("stop").await;
        assert!(!client.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_frequency_uses_the_default() {
        let (client, mut bridge) = FakeBridge::new(Duration::from_secs(10));
        let mut watch = client.watch(Some(Duration::ZERO));

        let callback = bridge.next_request("start").await;
        bridge.reading(&callback, 7.0);
        settle().await;

        let started = Instant::now();
        assert_matches!(watch.next().await, Some(Ok(r)) if r.x() == 7.0);
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        client.clear_watch(watch.id());
        bridge.next_request("stop").await;
        assert!(!client.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_default_frequency_falls_back_to_ten_seconds() {
        let (client, mut bridge) = FakeBridge::new(Duration::ZERO);
        let mut watch = client.watch(None);

        let callback = bridge.next_request("start").await;
        bridge.reading(&callback, 8.0);
        settle().await;

        let started = Instant::now();
        assert_matches!(watch.next().await, Some(Ok(r)) if r.x() == 8.0);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn second_watch_gets_cached_value_immediately() {
        let (client, mut bridge) = FakeBridge::new(Duration::from_secs(10));
        let first = client.watch(None);
        let callback = bridge.next_request("start").await;
        bridge.reading(&callback, 3.0);
        settle().await;

        let mut second = client.watch(None);
        let started = Instant::now();
        assert_matches!(second.next().await, Some(Ok(r)) if r.x() == 3.0);
        assert_eq!(started.elapsed(), Duration::ZERO);

        // Un seul démarrage pour les deux abonnements
        client.clear_watch(second.id());
        settle().await;
        assert!(bridge.requests.try_recv().is_err());

        client.clear_watch(first.id());
        bridge.next_request("stop").await;
    }

    #[tokio::test(start_paused = true)]
    async fn frames_for_other_callbacks_are_ignored() {
        let (client, mut bridge) = FakeBridge::new(Duration::from_secs(10));
        let _watch = client.watch(None);
        bridge.next_request("start").await;

        bridge.reading("Magnetometer99", 9.0);
        settle().await;
        assert_eq!(client.latest(), None);
        assert!(client.is_running());
    }
}
