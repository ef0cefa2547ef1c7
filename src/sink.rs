use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::MonitorError;
use crate::sensors::mag::Reading;

/// Canal de retour vers l'appelant
pub trait ResultSink {
    /// `keep_open` : d'autres trames peuvent suivre sur la même requête
    fn success(&mut self, reading: Reading, keep_open: bool);

    fn failure(&mut self, error: &MonitorError);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: i32,
    pub message: String,
}

impl From<&MonitorError> for ErrorPayload {
    fn from(error: &MonitorError) -> Self {
        ErrorPayload {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum FrameBody {
    /// Accusé de réception d'une commande
    NoResult,
    Ok(Reading),
    Error(ErrorPayload),
    InvalidAction,
}

/// Trame envoyée à l'hôte, une ligne JSON sur la sortie du pont
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub callback_id: String,
    pub keep_callback: bool,
    #[serde(flatten)]
    pub body: FrameBody,
}

impl Frame {
    pub fn ack(callback_id: impl Into<String>) -> Self {
        Frame {
            callback_id: callback_id.into(),
            keep_callback: true,
            body: FrameBody::NoResult,
        }
    }

    pub fn ok(callback_id: impl Into<String>, reading: Reading, keep_callback: bool) -> Self {
        Frame {
            callback_id: callback_id.into(),
            keep_callback,
            body: FrameBody::Ok(reading),
        }
    }

    /// Une trame d'erreur ferme le canal
    pub fn error(callback_id: impl Into<String>, error: &MonitorError) -> Self {
        Frame {
            callback_id: callback_id.into(),
            keep_callback: false,
            body: FrameBody::Error(error.into()),
        }
    }

    pub fn invalid_action(callback_id: impl Into<String>) -> Self {
        Frame {
            callback_id: callback_id.into(),
            keep_callback: false,
            body: FrameBody::InvalidAction,
        }
    }
}

/// Aiguille les résultats du moniteur vers la dernière requête `start`
pub struct ChannelSink {
    callback_id: Option<String>,
    frames: UnboundedSender<Frame>,
}

impl ChannelSink {
    pub fn new(frames: UnboundedSender<Frame>) -> Self {
        ChannelSink {
            callback_id: None,
            frames,
        }
    }

    pub fn bind(&mut self, callback_id: impl Into<String>) {
        self.callback_id = Some(callback_id.into());
    }

    pub fn unbind(&mut self) -> Option<String> {
        self.callback_id.take()
    }

    pub fn callback_id(&self) -> Option<&str> {
        self.callback_id.as_deref()
    }

    pub fn send(&self, frame: Frame) {
        if self.frames.send(frame).is_err() {
            tracing::debug!("[BRIDGE] Plus de destinataire pour les trames.");
        }
    }
}

impl ResultSink for ChannelSink {
    fn success(&mut self, reading: Reading, keep_open: bool) {
        match &self.callback_id {
            Some(id) => self.send(Frame::ok(id.as_str(), reading, keep_open)),
            None => tracing::trace!("[BRIDGE] Mesure sans requête en attente ignorée."),
        }

        if !keep_open {
            self.callback_id = None;
        }
    }

    fn failure(&mut self, error: &MonitorError) {
        match self.callback_id.take() {
            Some(id) => self.send(Frame::error(id, error)),
            None => tracing::warn!("[BRIDGE] Erreur sans requête en attente: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Accuracy;
    use nalgebra::Vector3;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn frames_serialize_as_host_json() {
        let reading = Reading::new(Vector3::new(0.0, 3.0, 4.0), Accuracy::Low, 10);

        assert_eq!(
            serde_json::to_value(Frame::ok("Magnetometer1", reading, true)).unwrap(),
            json!({
                "callbackId": "Magnetometer1",
                "keepCallback": true,
                "status": "ok",
                "message": {
                    "x": 0.0, "y": 3.0, "z": 4.0,
                    "accuracy": 1, "timestamp": 10, "magnitude": 5.0,
                },
            })
        );

        assert_eq!(
            serde_json::to_value(Frame::error("Magnetometer1", &MonitorError::SensorUnavailable))
                .unwrap(),
            json!({
                "callbackId": "Magnetometer1",
                "keepCallback": false,
                "status": "error",
                "message": { "code": 3, "message": "Device sensor returned an error." },
            })
        );

        assert_eq!(
            serde_json::to_value(Frame::ack("Magnetometer2")).unwrap(),
            json!({ "callbackId": "Magnetometer2", "keepCallback": true, "status": "noResult" })
        );
    }

    #[test]
    fn sink_routes_to_bound_callback_and_closes_on_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = ChannelSink::new(tx);
        let reading = Reading::new(Vector3::zeros(), Accuracy::Medium, 0);

        // Rien n'est lié : la mesure est perdue
        sink.success(reading, true);
        assert!(rx.try_recv().is_err());

        sink.bind("Magnetometer7");
        sink.success(reading, true);
        assert_eq!(rx.try_recv().unwrap(), Frame::ok("Magnetometer7", reading, true));

        sink.failure(&MonitorError::SensorUnavailable);
        assert_eq!(
            rx.try_recv().unwrap(),
            Frame::error("Magnetometer7", &MonitorError::SensorUnavailable)
        );
        assert_eq!(sink.callback_id(), None);

        sink.success(reading, true);
        assert!(rx.try_recv().is_err());
    }
}
