//! Machine à états du magnétomètre.
//!
//! ```text
//! Stopped / ErrorFailedToStart --start--> Starting   (capteur enregistré, minuteur armé)
//! Stopped / ErrorFailedToStart --start--> ErrorFailedToStart   (pas de capteur / refus)
//! Starting --évènement capteur--> Running
//! * --stop--> Stopped
//! ```
//!
//! Toutes les méthodes doivent être appelées depuis un seul propriétaire
//! (voir `bridge`) : le moniteur ne se protège pas lui-même.

use std::time::Duration;

use nalgebra::Vector3;

use crate::error::MonitorError;
use crate::sensors::mag::Reading;
use crate::sensors::{Accuracy, SensorKind, SensorListener, SensorSource, Subscription, SubscriptionId};
use crate::sink::ResultSink;
use crate::timer::TimeoutScheduler;

/// Délai avant de renvoyer la dernière mesure connue si rien n'arrive
pub const START_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Starting,
    Running,
    ErrorFailedToStart,
}

impl Status {
    pub fn ordinal(self) -> u8 {
        match self {
            Status::Stopped => 0,
            Status::Starting => 1,
            Status::Running => 2,
            Status::ErrorFailedToStart => 3,
        }
    }
}

pub struct MagnetometerMonitor<S, T, R> {
    source: S,
    timer: T,
    sink: R,
    status: Status,
    accuracy: Accuracy,
    field: Vector3<f32>,
    timestamp: u64,
    subscription: Option<Subscription>,
}

impl<S, T, R> MagnetometerMonitor<S, T, R>
where
    S: SensorSource,
    T: TimeoutScheduler,
    R: ResultSink,
{
    /// Constructeur
    pub fn new(source: S, timer: T, sink: R) -> Self {
        MagnetometerMonitor {
            source,
            timer,
            sink,
            status: Status::Stopped,
            accuracy: Accuracy::Medium,
            field: Vector3::zeros(),
            timestamp: 0,
            subscription: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn accuracy(&self) -> Accuracy {
        self.accuracy
    }

    /// Dernière mesure enregistrée (éventuellement le zéro initial)
    pub fn reading(&self) -> Reading {
        Reading::new(self.field, self.accuracy, self.timestamp)
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription.as_ref().map(Subscription::id)
    }

    pub fn sink_mut(&mut self) -> &mut R {
        &mut self.sink
    }

    /// Démarre l'écoute du magnétomètre et retourne le nouvel état
    pub fn start(&mut self) -> Status {
        // Déjà en route : on relance seulement la fenêtre de 2 secondes
        if matches!(self.status, Status::Starting | Status::Running) {
            self.timer.arm(START_TIMEOUT);
            return self.status;
        }

        self.status = Status::Starting;

        let sensor = match self.source.default_sensor(SensorKind::MagneticField) {
            Some(sensor) => sensor,
            None => {
                tracing::warn!("[MAG] Aucun magnétomètre disponible.");
                return self.fail(MonitorError::SensorUnavailable);
            }
        };

        match self.source.register(&sensor) {
            Ok(subscription) => {
                tracing::debug!("[MAG] Enregistré auprès de {} ({}).", sensor.name, subscription.id());
                self.subscription = Some(subscription);
                self.accuracy = Accuracy::Medium;
            }
            Err(e) => {
                tracing::warn!("[MAG] Enregistrement refusé: {:#}", e);
                return self.fail(MonitorError::SensorUnavailable);
            }
        }

        self.timer.arm(START_TIMEOUT);
        self.status
    }

    /// Arrête l'écoute. Sans effet si déjà arrêté.
    pub fn stop(&mut self) {
        self.timer.cancel();

        if let Some(subscription) = self.subscription.take() {
            self.source.unregister(subscription);
        }

        if self.status != Status::Stopped {
            tracing::debug!("[MAG] Arrêt ({:?} -> Stopped).", self.status);
        }

        self.status = Status::Stopped;
        self.accuracy = Accuracy::Unreliable;
    }

    /// Expiration de la fenêtre de démarrage.
    ///
    /// Renvoie la dernière mesure connue, même ancienne ou nulle, tant que
    /// le capteur n'a rien envoyé et que la précision reste exploitable.
    pub fn on_timer_fired(&mut self, now_ms: u64) {
        if self.status == Status::Starting && self.accuracy.is_usable() {
            tracing::debug!("[MAG] Pas de mesure après {:?}, envoi de la dernière connue.", START_TIMEOUT);
            self.timestamp = now_ms;
            self.sink.success(self.reading(), true);
        }
    }

    /// Remise à zéro du contexte propriétaire (navigation, rechargement)
    pub fn on_teardown(&mut self) {
        if self.status == Status::Running {
            self.stop();
        }
    }

    fn fail(&mut self, error: MonitorError) -> Status {
        self.status = Status::ErrorFailedToStart;
        self.sink.failure(&error);
        self.status
    }
}

impl<S, T, R> SensorListener for MagnetometerMonitor<S, T, R>
where
    S: SensorSource,
    T: TimeoutScheduler,
    R: ResultSink,
{
    fn on_accuracy_changed(&mut self, kind: SensorKind, accuracy: Accuracy) {
        if kind != SensorKind::MagneticField || self.status == Status::Stopped {
            return;
        }

        tracing::trace!("[MAG] Précision: {:?}", accuracy);
        self.accuracy = accuracy;
    }

    fn on_sensor_event(&mut self, kind: SensorKind, values: Vector3<f32>, now_ms: u64) {
        if kind != SensorKind::MagneticField || self.status == Status::Stopped {
            return;
        }

        self.status = Status::Running;

        if self.accuracy.is_usable() {
            self.field = values;
            self.timestamp = now_ms;
            self.sink.success(self.reading(), true);
        }
    }
}
