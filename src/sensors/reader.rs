use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::sensors::{
    Accuracy, MagDevice, Sensor, SensorKind, SensorMessage, SensorSource, Subscription,
    SubscriptionId,
};

type Opener<D> = Box<dyn FnMut(&Sensor) -> anyhow::Result<D> + Send>;

struct Worker {
    subscription: SubscriptionId,
    token: CancellationToken,
}

/// Source qui interroge un magnétomètre dans un thread dédié.
///
/// Chaque mesure est postée sur `events`, étiquetée avec l'abonnement qui l'a
/// produite. Le thread s'arrête sur annulation du jeton ou quand plus personne
/// n'écoute.
pub struct PollingSource<D> {
    sensors: Vec<Sensor>,
    open: Opener<D>,
    period: Duration,
    events: UnboundedSender<SensorMessage>,
    worker: Option<Worker>,
}

impl<D: MagDevice> PollingSource<D> {
    pub fn new<F>(
        sensors: Vec<Sensor>,
        period: Duration,
        events: UnboundedSender<SensorMessage>,
        open: F,
    ) -> Self
    where
        F: FnMut(&Sensor) -> anyhow::Result<D> + Send + 'static,
    {
        PollingSource {
            sensors,
            open: Box::new(open),
            period,
            events,
            worker: None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| !w.token.is_cancelled())
            .unwrap_or(false)
    }
}

impl<D: MagDevice> SensorSource for PollingSource<D> {
    fn default_sensor(&mut self, kind: SensorKind) -> Option<Sensor> {
        self.sensors.iter().find(|s| s.kind == kind).cloned()
    }

    fn register(&mut self, sensor: &Sensor) -> anyhow::Result<Subscription> {
        if self.is_registered() {
            bail!("[MAG] Capteur déjà enregistré.");
        }

        if !self.sensors.contains(sensor) {
            bail!("[MAG] Capteur inconnu: {}", sensor.name);
        }

        let device = (self.open)(sensor)?;
        let subscription = Subscription::new(sensor.kind);
        let token = CancellationToken::new();

        let thread_token = token.clone();
        let events = self.events.clone();
        let period = self.period;
        let id = subscription.id();
        let kind = sensor.kind;

        tracing::debug!("[MAG] Démarrage du thread ({}) ...", sensor.name);
        thread::Builder::new()
            .name("mag-reader".into())
            .spawn(move || poll(device, id, kind, period, events, thread_token))
            .map_err(|e| anyhow!("[MAG] Impossible de lancer le thread: {}", e))?;

        self.worker = Some(Worker {
            subscription: id,
            token,
        });

        Ok(subscription)
    }

    fn unregister(&mut self, subscription: Subscription) {
        match self.worker.take() {
            Some(worker) if worker.subscription == subscription.id() => {
                tracing::debug!("[MAG] Arrêt du thread ...");
                worker.token.cancel();
            }
            other => {
                tracing::trace!("[MAG] Désenregistrement d'un abonnement inconnu ignoré.");
                self.worker = other;
            }
        }
    }
}

impl<D> Drop for PollingSource<D> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.token.cancel();
        }
    }
}

fn poll<D: MagDevice>(
    mut device: D,
    subscription: SubscriptionId,
    kind: SensorKind,
    period: Duration,
    events: UnboundedSender<SensorMessage>,
    token: CancellationToken,
) {
    let mut last_accuracy: Option<Accuracy> = None;

    let send_accuracy = |accuracy: Accuracy, last: &mut Option<Accuracy>| {
        if *last == Some(accuracy) {
            return true;
        }
        *last = Some(accuracy);
        events
            .send(SensorMessage::Accuracy {
                subscription,
                kind,
                accuracy,
            })
            .is_ok()
    };

    while !token.is_cancelled() {
        let alive = match device.read_field() {
            Ok(sample) => {
                send_accuracy(sample.accuracy, &mut last_accuracy)
                    && events
                        .send(SensorMessage::Reading {
                            subscription,
                            kind,
                            values: sample.field,
                        })
                        .is_ok()
            }
            Err(e) => {
                if last_accuracy != Some(Accuracy::Unreliable) {
                    tracing::warn!("[MAG] Erreur lors de la récupération des données: {}", e);
                }
                send_accuracy(Accuracy::Unreliable, &mut last_accuracy)
            }
        };

        if !alive {
            break;
        }

        thread::sleep(period);
    }

    tracing::debug!("[MAG] Fin du thread.");
}
