use nalgebra::Vector3;
use rppal::i2c::I2c;

pub trait I2CBit {
    fn ecriture_word(&self, command: u8, data: u8) -> anyhow::Result<()>;
    fn lecture_bloc(&self, command: u8, buffer: &mut [u8]) -> anyhow::Result<()>;
}

impl I2CBit for I2c {
    // Ecrit un octet (word) sur la position donnée d'un registre 8 bits
    fn ecriture_word(&self, command: u8, data: u8) -> anyhow::Result<()> {
        self.block_write(command, &[data])?;
        Ok(())
    }

    /// Lecture de plusieurs registres consécutifs à partir de `command`
    fn lecture_bloc(&self, command: u8, buffer: &mut [u8]) -> anyhow::Result<()> {
        self.block_read(command, buffer)?;
        Ok(())
    }
}

/// Décode trois entiers 16 bits big-endian consécutifs
pub fn decode_be_axes(buffer: &[u8; 6]) -> Vector3<i16> {
    Vector3::new(
        i16::from_be_bytes([buffer[0], buffer[1]]),
        i16::from_be_bytes([buffer[2], buffer[3]]),
        i16::from_be_bytes([buffer[4], buffer[5]]),
    )
}
