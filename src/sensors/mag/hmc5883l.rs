use anyhow::bail;
use nalgebra::Vector3;
use rppal::i2c::I2c;

use crate::i2c::{decode_be_axes, I2CBit};
use crate::sensors::mag::registry;
use crate::sensors::{Accuracy, MagDevice, MagSample};

/// Magnétomètre HMC5883L sur le bus I2C du Raspberry
pub struct HMC5883L {
    i2c: I2c,
}

impl HMC5883L {
    /// Constructeur
    pub fn new(address: u16) -> anyhow::Result<Self> {
        let mut i2c = I2c::new()?;
        i2c.set_slave_address(address)?;

        let mag = Self { i2c };

        // Vérifie que c'est bien le bon composant avant de le configurer
        mag.check_identity()?;
        mag.init_module()?;

        Ok(mag)
    }

    fn check_identity(&self) -> anyhow::Result<()> {
        let mut id = [0u8; 3];
        self.i2c.lecture_bloc(registry::HMC5883L_ID_A, &mut id)?;

        if id != registry::HMC5883L_ID {
            bail!("[HMC5883L] Identifiant inattendu: {:02x?}", id);
        }

        Ok(())
    }

    /// Initialise rapidement le module avec des valeurs pré-défini
    fn init_module(&self) -> anyhow::Result<()> {
        tracing::debug!("[HMC5883L] Initialisation ...");

        self.i2c.ecriture_word(registry::HMC5883L_CONF_A, registry::HMC5883L_CONF_A_VAL)?;
        self.i2c.ecriture_word(registry::HMC5883L_CONF_B, registry::HMC5883L_CONF_B_VAL)?;

        // Activation de la mesure continue
        self.i2c.ecriture_word(registry::HMC5883L_MODE, registry::HMC5883L_MODE_CONTINUOUS)?;

        tracing::debug!("[HMC5883L] Fin d'initialisation.");
        Ok(())
    }

    /// Récupére les données raw (ordre X, Y, Z)
    fn get_mag_axes_raw(&self) -> anyhow::Result<Vector3<i16>> {
        let mut buffer = [0u8; 6];
        self.i2c.lecture_bloc(registry::HMC5883L_X_H, &mut buffer)?;

        // Le composant range les axes dans l'ordre X, Z, Y
        let xzy = decode_be_axes(&buffer);
        Ok(Vector3::new(xzy.x, xzy.z, xzy.y))
    }
}

impl MagDevice for HMC5883L {
    fn read_field(&mut self) -> anyhow::Result<MagSample> {
        Ok(to_sample(self.get_mag_axes_raw()?))
    }
}

/// Conversion LSB -> µT. Un axe saturé rend la mesure non fiable.
fn to_sample(raw: Vector3<i16>) -> MagSample {
    let overflow = raw.iter().any(|&axis| axis == registry::HMC5883L_OVERFLOW);
    let scale = registry::MICROTESLA_PER_GAUSS / registry::HMC5883L_GAIN_LSB_PER_GAUSS;

    MagSample {
        field: raw.map(|axis| axis as f32 * scale),
        accuracy: if overflow {
            Accuracy::Unreliable
        } else {
            Accuracy::High
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_raw_counts_to_microtesla() {
        let sample = to_sample(Vector3::new(1090, -545, 0));
        assert!((sample.field.x - 100.0).abs() < 1e-4);
        assert!((sample.field.y + 50.0).abs() < 1e-4);
        assert_eq!(sample.field.z, 0.0);
        assert_eq!(sample.accuracy, Accuracy::High);
    }

    #[test]
    fn overflowed_axis_is_unreliable() {
        let sample = to_sample(Vector3::new(12, registry::HMC5883L_OVERFLOW, 40));
        assert_eq!(sample.accuracy, Accuracy::Unreliable);
    }
}
