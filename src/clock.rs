use std::time::{SystemTime, UNIX_EPOCH};

/// Horloge en millisecondes utilisée pour horodater les mesures
pub trait Clock: Send + 'static {
    fn now_ms(&self) -> u64;
}

/// Millisecondes depuis l'epoch Unix
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl<F> Clock for F
where
    F: Fn() -> u64 + Send + 'static,
{
    fn now_ms(&self) -> u64 {
        self()
    }
}
