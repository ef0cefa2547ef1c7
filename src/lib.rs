//! Pont magnétomètre : expose un capteur de champ magnétique à un hôte par
//! un protocole requête / trames JSON.

pub mod bridge;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod monitor;
pub mod sensors;
pub mod sink;
pub mod stdio;
pub mod timer;

#[cfg(feature = "real-sensors")]
pub mod i2c;

pub use bridge::{Bridge, BridgeHandle, Request};
pub use client::{Magnetometer, Watch};
pub use config::{Config, DeviceKind};
pub use error::{BridgeError, ClientError, MonitorError};
pub use monitor::{MagnetometerMonitor, Status};
pub use sensors::mag::Reading;
pub use sink::{Frame, FrameBody};
