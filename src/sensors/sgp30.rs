//! Sensirion SGP30 eCO2/TVOC sensor over Linux I2C.
//!
//! Command set from the SGP30 datasheet, section 6.3. Every 16-bit word on
//! the wire is followed by a CRC-8 byte.

use std::{thread, time::Duration};

use i2cdev::{core::I2CDevice, linux::LinuxI2CDevice};

use super::SensorError;
use crate::models::BaselineWords;

pub const SGP30_ADDRESS: u16 = 0x58;

const CMD_IAQ_INIT: [u8; 2] = [0x20, 0x03];
const CMD_MEASURE_IAQ: [u8; 2] = [0x20, 0x08];
const CMD_GET_BASELINE: [u8; 2] = [0x20, 0x15];
const CMD_SET_BASELINE: [u8; 2] = [0x20, 0x1e];
const CMD_SET_HUMIDITY: [u8; 2] = [0x20, 0x61];
const CMD_GET_SERIAL: [u8; 2] = [0x36, 0x82];

/// Result of one `measure_iaq` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IaqMeasurement {
    pub eco2_ppm: u16,
    pub tvoc_ppb: u16,
}

pub struct Sgp30 {
    i2cdev: LinuxI2CDevice,
}

impl Sgp30 {
    pub fn open(bus: &str) -> Result<Self, SensorError> {
        let i2cdev = LinuxI2CDevice::new(bus, SGP30_ADDRESS)?;
        Ok(Self { i2cdev })
    }

    /// Start the on-chip IAQ algorithm. Must be followed by `measure_iaq`
    /// once per second for the baseline compensation to work.
    pub fn iaq_init(&mut self) -> Result<(), SensorError> {
        self.command(&CMD_IAQ_INIT, &[], 10)
    }

    pub fn measure_iaq(&mut self) -> Result<IaqMeasurement, SensorError> {
        let [eco2_ppm, tvoc_ppb] = self.read_words::<2>(&CMD_MEASURE_IAQ, 12)?;
        Ok(IaqMeasurement { eco2_ppm, tvoc_ppb })
    }

    pub fn get_iaq_baseline(&mut self) -> Result<BaselineWords, SensorError> {
        let [eco2, tvoc] = self.read_words::<2>(&CMD_GET_BASELINE, 10)?;
        Ok(BaselineWords { eco2, tvoc })
    }

    /// Restore a baseline. The sensor expects the TVOC word first.
    pub fn set_iaq_baseline(&mut self, baseline: BaselineWords) -> Result<(), SensorError> {
        self.command(&CMD_SET_BASELINE, &[baseline.tvoc, baseline.eco2], 10)
    }

    /// Absolute humidity compensation, in g/m³. Zero disables compensation.
    pub fn set_absolute_humidity(&mut self, grams_per_m3: f32) -> Result<(), SensorError> {
        self.command(&CMD_SET_HUMIDITY, &[humidity_word(grams_per_m3)], 10)
    }

    pub fn serial(&mut self) -> Result<[u16; 3], SensorError> {
        self.read_words::<3>(&CMD_GET_SERIAL, 10)
    }

    fn command(&mut self, cmd: &[u8; 2], args: &[u16], delay_ms: u64) -> Result<(), SensorError> {
        let mut buffer = cmd.to_vec();
        for word in args {
            buffer.extend_from_slice(&encode_word(*word));
        }
        self.i2cdev.write(&buffer)?;
        thread::sleep(Duration::from_millis(delay_ms));
        Ok(())
    }

    fn read_words<const N: usize>(
        &mut self,
        cmd: &[u8; 2],
        delay_ms: u64,
    ) -> Result<[u16; N], SensorError> {
        self.command(cmd, &[], delay_ms)?;
        let mut raw = vec![0u8; N * 3];
        self.i2cdev.read(&mut raw)?;
        decode_words(&raw)
    }
}

/// Sensirion CRC-8: polynomial 0x31, init 0xFF, no final XOR.
pub fn crc8(data: &[u8]) -> u8 {
    let mut rem: u8 = 0xFF;
    for byte in data {
        rem ^= byte;
        for _ in 0..8 {
            if rem & 0x80 != 0 {
                rem = (rem << 1) ^ 0x31;
            } else {
                rem <<= 1;
            }
        }
    }
    rem
}

fn encode_word(word: u16) -> [u8; 3] {
    let [hi, lo] = word.to_be_bytes();
    [hi, lo, crc8(&[hi, lo])]
}

/// Split `word, word, ...` triplets, verifying each CRC.
fn decode_words<const N: usize>(raw: &[u8]) -> Result<[u16; N], SensorError> {
    if raw.len() != N * 3 {
        return Err(SensorError::ShortRead { expected: N * 3, got: raw.len() });
    }
    let mut words = [0u16; N];
    for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(3)) {
        if crc8(&chunk[..2]) != chunk[2] {
            return Err(SensorError::Checksum);
        }
        *word = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(words)
}

/// 8.8 fixed point, clamped to the 0..=255.996 g/m³ range the sensor accepts.
fn humidity_word(grams_per_m3: f32) -> u16 {
    (grams_per_m3.clamp(0.0, 255.996) * 256.0).round() as u16
}

/// Absolute humidity in g/m³ from temperature and relative humidity
/// (Sensirion SGP30 driver integration guide, Magnus formula).
pub fn absolute_humidity(temperature_c: f32, humidity_pct: f32) -> f32 {
    let saturation = 6.112 * ((17.62 * temperature_c) / (243.12 + temperature_c)).exp();
    216.7 * ((humidity_pct / 100.0) * saturation / (273.15 + temperature_c))
}
