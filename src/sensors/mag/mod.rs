use std::fmt;

use nalgebra::Vector3;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::config::{Config, DeviceKind};
use crate::sensors::{Accuracy, MagDevice};

#[cfg(feature = "real-sensors")]
pub mod hmc5883l;

pub(crate) mod registry;

#[cfg(feature = "fake-sensors")]
pub mod fake;

/// Mesure du champ magnétique telle que renvoyée à l'appelant.
///
/// La norme n'est jamais stockée : elle est recalculée depuis x, y, z.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    field: Vector3<f32>,
    accuracy: Accuracy,
    timestamp: u64,
}

impl Reading {
    pub fn new(field: Vector3<f32>, accuracy: Accuracy, timestamp: u64) -> Self {
        Reading {
            field,
            accuracy,
            timestamp,
        }
    }

    pub fn x(&self) -> f32 {
        self.field.x
    }

    pub fn y(&self) -> f32 {
        self.field.y
    }

    pub fn z(&self) -> f32 {
        self.field.z
    }

    pub fn field(&self) -> Vector3<f32> {
        self.field
    }

    pub fn accuracy(&self) -> Accuracy {
        self.accuracy
    }

    /// Millisecondes depuis l'epoch
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// sqrt(x² + y² + z²), carrés calculés en f32 puis sommés en f64
    pub fn magnitude(&self) -> f64 {
        let x2 = (self.field.x * self.field.x) as f64;
        let y2 = (self.field.y * self.field.y) as f64;
        let z2 = (self.field.z * self.field.z) as f64;
        (x2 + y2 + z2).sqrt()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X: {:.2} Y: {:.2} Z: {:.2} |B|: {:.2} µT (précision {})",
            self.field.x,
            self.field.y,
            self.field.z,
            self.magnitude(),
            self.accuracy.ordinal()
        )
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Reading", 6)?;
        state.serialize_field("x", &self.field.x)?;
        state.serialize_field("y", &self.field.y)?;
        state.serialize_field("z", &self.field.z)?;
        state.serialize_field("accuracy", &self.accuracy)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("magnitude", &self.magnitude())?;
        state.end()
    }
}

/// Ouvre le magnétomètre choisi dans la configuration
pub fn open_device(config: &Config) -> anyhow::Result<Box<dyn MagDevice>> {
    match config.device {
        #[cfg(feature = "fake-sensors")]
        DeviceKind::Fake => Ok(Box::new(fake::FakeMag::new())),

        #[cfg(feature = "real-sensors")]
        DeviceKind::Hmc5883l => Ok(Box::new(hmc5883l::HMC5883L::new(config.i2c_address())?)),

        other => Err(anyhow::anyhow!(
            "[MAG] Capteur {:?} non disponible dans cette compilation.",
            other
        )),
    }
}
