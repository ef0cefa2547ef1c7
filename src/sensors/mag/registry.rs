#![allow(unused)]

// HMC5883L
pub const HMC5883L_MAG_ADDR: u16 = 0x1E;

pub const HMC5883L_CONF_A: u8 = 0x00;
pub const HMC5883L_CONF_B: u8 = 0x01;
pub const HMC5883L_MODE: u8 = 0x02;
pub const HMC5883L_X_H: u8 = 0x03;
pub const HMC5883L_X_L: u8 = 0x04;
pub const HMC5883L_Z_H: u8 = 0x05;
pub const HMC5883L_Z_L: u8 = 0x06;
pub const HMC5883L_Y_H: u8 = 0x07;
pub const HMC5883L_Y_L: u8 = 0x08;
pub const HMC5883L_STATUS: u8 = 0x09;
pub const HMC5883L_ID_A: u8 = 0x0A;

// Identification attendue dans ID_A, ID_B, ID_C
pub const HMC5883L_ID: [u8; 3] = *b"H43";

// 8 moyennes, 15 Hz, mesure normale
pub const HMC5883L_CONF_A_VAL: u8 = 0x70;
// Gain 1090 LSB/Gauss (±1.3 Ga)
pub const HMC5883L_CONF_B_VAL: u8 = 0x20;
pub const HMC5883L_GAIN_LSB_PER_GAUSS: f32 = 1090.0;
// Mesure continue
pub const HMC5883L_MODE_CONTINUOUS: u8 = 0x00;

// Valeur renvoyée par un axe en dépassement
pub const HMC5883L_OVERFLOW: i16 = -4096;

pub const MICROTESLA_PER_GAUSS: f32 = 100.0;
