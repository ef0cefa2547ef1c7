//! Pont entre l'hôte (requêtes / trames) et le moniteur.
//!
//! Une seule tâche tokio possède le moniteur. Requêtes, évènements capteur et
//! expirations du minuteur arrivent par des files distinctes et sont traités
//! un par un dans cette tâche, ce qui sérialise toutes les transitions.

use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::BridgeError;
use crate::monitor::MagnetometerMonitor;
use crate::sensors::{SensorListener, SensorMessage, SensorSource};
use crate::sink::{ChannelSink, Frame};
use crate::timer::{TimerGate, TimerId, TokioTimeout};

/// Requête de l'hôte, une ligne JSON
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub callback_id: String,
    pub action: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl Request {
    pub fn new(callback_id: impl Into<String>, action: impl Into<String>) -> Self {
        Request {
            callback_id: callback_id.into(),
            action: action.into(),
            args: serde_json::Value::Array(Vec::new()),
        }
    }

    pub fn parse(line: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(line)?)
    }
}

enum Control {
    Request(Request),
    Reset,
}

#[derive(Clone)]
pub struct BridgeHandle {
    tx: UnboundedSender<Control>,
}

impl BridgeHandle {
    pub fn send(&self, request: Request) -> Result<(), BridgeError> {
        self.tx
            .send(Control::Request(request))
            .map_err(|_| BridgeError::Closed)
    }

    /// Équivalent d'une navigation de l'hôte : arrête le moniteur s'il tourne
    pub fn reset(&self) -> Result<(), BridgeError> {
        self.tx.send(Control::Reset).map_err(|_| BridgeError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Poignée sans moniteur derrière : les requêtes ressortent telles quelles
    #[cfg(test)]
    pub(crate) fn detached() -> (BridgeHandle, UnboundedReceiver<Request>) {
        let (tx, mut control_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(control) = control_rx.recv().await {
                if let Control::Request(request) = control {
                    if request_tx.send(request).is_err() {
                        break;
                    }
                }
            }
        });

        (BridgeHandle { tx }, request_rx)
    }
}

type Monitor<S> = MagnetometerMonitor<S, TokioTimeout, ChannelSink>;

pub struct Bridge {
    pub handle: BridgeHandle,
    pub frames: UnboundedReceiver<Frame>,
    pub task: JoinHandle<()>,
}

impl Bridge {
    /// Lance la tâche propriétaire du moniteur.
    ///
    /// `make_source` reçoit l'émetteur sur lequel la source doit poster ses
    /// évènements. La tâche se termine sur annulation de `token` ou quand tous
    /// les `BridgeHandle` ont disparu ; le moniteur est alors arrêté.
    pub fn spawn<S, F, C>(make_source: F, clock: C, token: CancellationToken) -> Bridge
    where
        S: SensorSource + Send + 'static,
        F: FnOnce(UnboundedSender<SensorMessage>) -> S,
        C: Clock,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (sensor_tx, sensor_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        let source = make_source(sensor_tx);
        let timer = TokioTimeout::new(timer_tx);
        let gate = timer.gate();
        let monitor = MagnetometerMonitor::new(source, timer, ChannelSink::new(frame_tx));

        let owner = Owner {
            monitor,
            gate,
            clock,
        };
        let task = tokio::spawn(owner.run(control_rx, sensor_rx, timer_rx, token));

        Bridge {
            handle: BridgeHandle { tx: control_tx },
            frames: frame_rx,
            task,
        }
    }
}

struct Owner<S, C> {
    monitor: Monitor<S>,
    gate: TimerGate,
    clock: C,
}

impl<S: SensorSource, C: Clock> Owner<S, C> {
    async fn run(
        mut self,
        mut control_rx: UnboundedReceiver<Control>,
        mut sensor_rx: UnboundedReceiver<SensorMessage>,
        mut timer_rx: UnboundedReceiver<TimerId>,
        token: CancellationToken,
    ) {
        tracing::info!("[BRIDGE] Prêt.");

        loop {
            // Commandes de l'hôte déjà en file avant le trafic capteur
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                control = control_rx.recv() => match control {
                    Some(Control::Request(request)) => self.handle_request(request),
                    Some(Control::Reset) => self.monitor.on_teardown(),
                    None => break,
                },

                Some(message) = sensor_rx.recv() => self.dispatch_sensor(message),

                Some(id) = timer_rx.recv() => {
                    if self.gate.accept(id) {
                        self.monitor.on_timer_fired(self.clock.now_ms());
                    } else {
                        tracing::trace!("[BRIDGE] Minuteur périmé ignoré.");
                    }
                }
            }
        }

        self.monitor.stop();
        tracing::info!("[BRIDGE] Arrêt.");
    }

    fn handle_request(&mut self, request: Request) {
        let Request {
            callback_id,
            action,
            ..
        } = request;

        match action.as_str() {
            "start" => {
                // L'accusé part avant : une éventuelle erreur est la dernière trame du canal
                self.monitor.sink_mut().send(Frame::ack(callback_id.as_str()));
                self.monitor.sink_mut().bind(callback_id);
                let status = self.monitor.start();
                tracing::debug!("[BRIDGE] start -> {:?}", status);
            }
            "stop" => {
                self.monitor.stop();
                self.monitor.sink_mut().unbind();
                self.monitor.sink_mut().send(Frame::ack(callback_id));
            }
            other => {
                tracing::warn!("[BRIDGE] Action inconnue: {}", other);
                self.monitor.sink_mut().send(Frame::invalid_action(callback_id));
            }
        }
    }

    fn dispatch_sensor(&mut self, message: SensorMessage) {
        // Évènement d'un abonnement déjà libéré : encore en file au moment du stop
        if self.monitor.subscription_id() != Some(message.subscription()) {
            tracing::trace!("[BRIDGE] Évènement d'un abonnement périmé ignoré.");
            return;
        }

        match message {
            SensorMessage::Accuracy { kind, accuracy, .. } => {
                self.monitor.on_accuracy_changed(kind, accuracy)
            }
            SensorMessage::Reading { kind, values, .. } => {
                self.monitor.on_sensor_event(kind, values, self.clock.now_ms())
            }
        }
    }
}
