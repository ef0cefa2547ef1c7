use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sensors::{Accuracy, MagDevice, MagSample};

/// Intensité plausible du champ terrestre, en µT
const EARTH_FIELD_UT: std::ops::Range<f32> = 25.0..65.0;

/// Magnétomètre simulé (pas de matériel)
pub struct FakeMag {
    rng: StdRng,
}

impl FakeMag {
    pub fn new() -> Self {
        FakeMag {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        FakeMag {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for FakeMag {
    fn default() -> Self {
        Self::new()
    }
}

impl MagDevice for FakeMag {
    fn read_field(&mut self) -> anyhow::Result<MagSample> {
        let direction = Vector3::new(
            self.rng.gen_range(-1.0f32..1.0),
            self.rng.gen_range(-1.0f32..1.0),
            self.rng.gen_range(-1.0f32..1.0),
        );
        let intensity = self.rng.gen_range(EARTH_FIELD_UT);

        // Direction dégénérée : on retombe sur un champ vertical
        let field = direction
            .try_normalize(1e-6)
            .unwrap_or_else(Vector3::z)
            * intensity;

        Ok(MagSample {
            field,
            accuracy: Accuracy::High,
        })
    }
}
