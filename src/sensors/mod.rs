//! Abstractions autour du sous-système capteur.
//!
//! Le moniteur ne connaît que ces traits : une source qui enregistre et
//! désenregistre les abonnements, et un écouteur qui reçoit les évènements.

use std::fmt;

use nalgebra::Vector3;
use serde::{Serialize, Serializer};
use uuid::Uuid;

pub mod mag;
pub mod reader;

/// Type de capteur tel que rapporté par la plateforme
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SensorKind {
    MagneticField,
    Accelerometer,
    Gyroscope,
    Other(u32),
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::MagneticField => write!(f, "magnetic field"),
            SensorKind::Accelerometer => write!(f, "accelerometer"),
            SensorKind::Gyroscope => write!(f, "gyroscope"),
            SensorKind::Other(id) => write!(f, "sensor #{}", id),
        }
    }
}

/// Précision annoncée par le capteur. L'ordre des variantes est celui des ordinaux.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Accuracy {
    Unreliable = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Accuracy {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Convertit un ordinal plateforme, `None` hors de 0..=3
    pub fn from_ordinal(value: i32) -> Option<Self> {
        match value {
            0 => Some(Accuracy::Unreliable),
            1 => Some(Accuracy::Low),
            2 => Some(Accuracy::Medium),
            3 => Some(Accuracy::High),
            _ => None,
        }
    }

    /// Seuil d'émission : au moins `Low`
    pub fn is_usable(self) -> bool {
        self >= Accuracy::Low
    }
}

impl Serialize for Accuracy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.ordinal())
    }
}

/// Description d'un capteur exposé par une source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sensor {
    pub kind: SensorKind,
    pub name: String,
}

impl Sensor {
    pub fn magnetic_field(name: impl Into<String>) -> Self {
        Sensor {
            kind: SensorKind::MagneticField,
            name: name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Enregistrement actif auprès d'une source.
///
/// Volontairement ni `Clone` ni `Copy` : un seul propriétaire, rendu à la
/// source par `SensorSource::unregister`.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    kind: SensorKind,
}

impl Subscription {
    pub fn new(kind: SensorKind) -> Self {
        Subscription {
            id: SubscriptionId(Uuid::new_v4()),
            kind,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }
}

/// Sous-système capteur de la plateforme
pub trait SensorSource {
    /// Premier capteur disponible de ce type
    fn default_sensor(&mut self, kind: SensorKind) -> Option<Sensor>;

    /// Enregistre l'écoute du capteur. Une erreur signifie un refus de la plateforme.
    fn register(&mut self, sensor: &Sensor) -> anyhow::Result<Subscription>;

    /// Libère l'abonnement. Sans effet si l'abonnement est inconnu.
    fn unregister(&mut self, subscription: Subscription);
}

/// Interface d'évènements exposée par le moniteur à sa source
pub trait SensorListener {
    fn on_accuracy_changed(&mut self, kind: SensorKind, accuracy: Accuracy);
    fn on_sensor_event(&mut self, kind: SensorKind, values: Vector3<f32>, now_ms: u64);
}

/// Évènement posté par une source vers le propriétaire du moniteur
#[derive(Clone, Debug, PartialEq)]
pub enum SensorMessage {
    Accuracy {
        subscription: SubscriptionId,
        kind: SensorKind,
        accuracy: Accuracy,
    },
    Reading {
        subscription: SubscriptionId,
        kind: SensorKind,
        values: Vector3<f32>,
    },
}

impl SensorMessage {
    pub fn subscription(&self) -> SubscriptionId {
        match self {
            SensorMessage::Accuracy { subscription, .. } => *subscription,
            SensorMessage::Reading { subscription, .. } => *subscription,
        }
    }
}

/// Échantillon brut d'un magnétomètre, en µT
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MagSample {
    pub field: Vector3<f32>,
    pub accuracy: Accuracy,
}

/// Magnétomètre matériel (ou simulé) interrogé par `reader::PollingSource`
pub trait MagDevice: Send + 'static {
    fn read_field(&mut self) -> anyhow::Result<MagSample>;
}

impl MagDevice for Box<dyn MagDevice> {
    fn read_field(&mut self) -> anyhow::Result<MagSample> {
        (**self).read_field()
    }
}
