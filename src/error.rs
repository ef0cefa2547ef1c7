use thiserror::Error;

use crate::monitor::Status;

/// Échec remonté par le moniteur à l'appelant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// Pas de magnétomètre, ou enregistrement refusé par la plateforme
    #[error("Device sensor returned an error.")]
    SensorUnavailable,
}

impl MonitorError {
    /// Code transmis dans la trame d'erreur
    pub fn code(&self) -> i32 {
        match self {
            MonitorError::SensorUnavailable => Status::ErrorFailedToStart.ordinal() as i32,
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge task is no longer running")]
    Closed,

    #[error("malformed request: {0}")]
    InvalidRequest(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{message} (code {code})")]
    Sensor { code: i32, message: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("magnetometer client shut down")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_unavailable_uses_failed_to_start_code() {
        let error = MonitorError::SensorUnavailable;
        assert_eq!(error.code(), 3);
        assert_eq!(error.to_string(), "Device sensor returned an error.");
    }
}
