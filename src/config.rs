use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::sensors::mag::registry::HMC5883L_MAG_ADDR;

/// Fréquence de `watch` quand aucune n'est donnée (ou 0)
pub const DEFAULT_WATCH_FREQUENCY_MS: u64 = 10_000;

/// Magnétomètre à utiliser
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Valeurs aléatoires, pour travailler sans matériel
    Fake,
    /// HMC5883L sur le bus I2C
    Hmc5883l,
    /// Aucun capteur : `start` échoue
    None,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub(crate) device: DeviceKind,
    /// Période d'échantillonnage du capteur (SENSOR_DELAY_UI)
    pub(crate) sample_period_ms: u64,
    pub(crate) i2c_address: u16,
    /// Fréquence par défaut de `watch`
    pub(crate) watch_frequency_ms: u64,
}

impl Config {
    pub fn new() -> Self {
        let config = Config {
            device: DeviceKind::Hmc5883l,
            sample_period_ms: 60,
            i2c_address: HMC5883L_MAG_ADDR,
            watch_frequency_ms: DEFAULT_WATCH_FREQUENCY_MS,
        };

        config
    }

    /// Lit un fichier JSON ; les champs absents gardent leur valeur par défaut
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("lecture de {}", path.display()))?;

        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("format invalide: {}", path.display()))?;

        config
            .checked()
            .with_context(|| format!("configuration invalide: {}", path.display()))
    }

    /// Refuse une période d'échantillonnage nulle, remplace une fréquence de
    /// `watch` nulle par la valeur par défaut.
    pub fn checked(mut self) -> anyhow::Result<Self> {
        if self.sample_period_ms == 0 {
            bail!("sample_period_ms doit être strictement positif");
        }

        if self.watch_frequency_ms == 0 {
            tracing::warn!(
                "watch_frequency_ms nul, utilisation de {} ms",
                DEFAULT_WATCH_FREQUENCY_MS
            );
            self.watch_frequency_ms = DEFAULT_WATCH_FREQUENCY_MS;
        }

        Ok(self)
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    pub fn set_device(&mut self, device: DeviceKind) {
        self.device = device;
    }

    pub fn set_sample_period_ms(&mut self, period: u64) {
        self.sample_period_ms = period;
    }

    pub fn i2c_address(&self) -> u16 {
        self.i2c_address
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn watch_frequency(&self) -> Duration {
        Duration::from_millis(self.watch_frequency_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
