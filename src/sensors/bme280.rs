//! Bosch BME280 temperature / humidity / pressure sensor, forced mode.
//!
//! Compensation uses the integer reference formulas from the BME280
//! datasheet, section 4.2.3.

use std::{thread, time::Duration};

use i2cdev::{core::I2CDevice, linux::LinuxI2CDevice};

use super::SensorError;

pub const BME280_ADDRESS: u16 = 0x76;

const REG_CHIP_ID: u8 = 0xD0;
const REG_CALIB_TP: u8 = 0x88;
const REG_CALIB_H1: u8 = 0xA1;
const REG_CALIB_H2: u8 = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_DATA: u8 = 0xF7;

const CHIP_ID: u8 = 0x60;
/// Oversampling x1 for humidity.
const CTRL_HUM_X1: u8 = 0b001;
/// Temperature x1, pressure x1, forced mode.
const CTRL_MEAS_FORCED: u8 = (0b001 << 5) | (0b001 << 2) | 0b01;
const STATUS_MEASURING: u8 = 0b1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p: [i64; 9],
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// Parse the 26-byte block at 0x88, the byte at 0xA1 and the 7-byte
    /// block at 0xE1.
    pub fn parse(tp: &[u8], h1: u8, h: &[u8]) -> Result<Self, SensorError> {
        if tp.len() < 24 {
            return Err(SensorError::ShortRead { expected: 24, got: tp.len() });
        }
        if h.len() < 7 {
            return Err(SensorError::ShortRead { expected: 7, got: h.len() });
        }
        let u16_at = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);

        let mut p = [0i64; 9];
        p[0] = i64::from(u16_at(6));
        for (n, slot) in p.iter_mut().enumerate().skip(1) {
            *slot = i64::from(i16_at(6 + n * 2));
        }

        Ok(Self {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p,
            h1,
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0F),
            h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            h6: h[6] as i8,
        })
    }

    /// Returns `(temperature in 0.01 °C, t_fine)`.
    pub fn compensate_temperature(&self, adc_t: i32) -> (i32, i32) {
        let t1 = i32::from(self.t1);
        let var1 = (((adc_t >> 3) - (t1 << 1)) * i32::from(self.t2)) >> 11;
        let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * i32::from(self.t3)) >> 14;
        let t_fine = var1 + var2;
        ((t_fine * 5 + 128) >> 8, t_fine)
    }

    /// Pressure in Pa as unsigned Q24.8.
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: i32) -> u32 {
        let p = &self.p;
        let mut var1 = i64::from(t_fine) - 128_000;
        let mut var2 = var1 * var1 * p[5];
        var2 += (var1 * p[4]) << 17;
        var2 += p[3] << 35;
        var1 = ((var1 * var1 * p[2]) >> 8) + ((var1 * p[1]) << 12);
        var1 = (((1i64 << 47) + var1) * p[0]) >> 33;
        if var1 == 0 {
            return 0;
        }
        let mut pressure = 1_048_576 - i64::from(adc_p);
        pressure = (((pressure << 31) - var2) * 3125) / var1;
        var1 = (p[8] * (pressure >> 13) * (pressure >> 13)) >> 25;
        var2 = (p[7] * pressure) >> 19;
        pressure = ((pressure + var1 + var2) >> 8) + (p[6] << 4);
        pressure as u32
    }

    /// Relative humidity as unsigned Q22.10.
    pub fn compensate_humidity(&self, adc_h: i32, t_fine: i32) -> u32 {
        let (h1, h2, h3) = (i64::from(self.h1), i64::from(self.h2), i64::from(self.h3));
        let (h4, h5, h6) = (i64::from(self.h4), i64::from(self.h5), i64::from(self.h6));
        let adc_h = i64::from(adc_h);

        let mut v = i64::from(t_fine) - 76_800;
        v = ((((adc_h << 14) - (h4 << 20) - (h5 * v)) + 16_384) >> 15)
            * (((((((v * h6) >> 10) * (((v * h3) >> 11) + 32_768)) >> 10) + 2_097_152) * h2
                + 8_192)
                >> 14);
        v -= ((((v >> 15) * (v >> 15)) >> 7) * h1) >> 4;
        v = v.clamp(0, 419_430_400);
        (v >> 12) as u32
    }

    pub fn compensate(&self, adc_t: i32, adc_p: i32, adc_h: i32) -> Environment {
        let (temp, t_fine) = self.compensate_temperature(adc_t);
        let pressure = self.compensate_pressure(adc_p, t_fine);
        let humidity = self.compensate_humidity(adc_h, t_fine);
        Environment {
            temperature_c: temp as f32 / 100.0,
            pressure_hpa: pressure as f32 / 256.0 / 100.0,
            humidity_pct: humidity as f32 / 1024.0,
        }
    }
}

pub struct Bme280 {
    i2cdev: LinuxI2CDevice,
    calibration: Calibration,
}

impl Bme280 {
    pub fn open(bus: &str) -> Result<Self, SensorError> {
        let mut i2cdev = LinuxI2CDevice::new(bus, BME280_ADDRESS)?;

        let id = i2cdev.smbus_read_byte_data(REG_CHIP_ID)?;
        if id != CHIP_ID {
            return Err(SensorError::UnexpectedId { sensor: "BME280", id });
        }

        let tp = i2cdev.smbus_read_i2c_block_data(REG_CALIB_TP, 24)?;
        let h1 = i2cdev.smbus_read_byte_data(REG_CALIB_H1)?;
        let h = i2cdev.smbus_read_i2c_block_data(REG_CALIB_H2, 7)?;
        let calibration = Calibration::parse(&tp, h1, &h)?;

        Ok(Self { i2cdev, calibration })
    }

    /// Trigger one forced-mode conversion and read it back.
    pub fn measure(&mut self) -> Result<Environment, SensorError> {
        // ctrl_hum only takes effect after a write to ctrl_meas.
        self.i2cdev.smbus_write_byte_data(REG_CTRL_HUM, CTRL_HUM_X1)?;
        self.i2cdev.smbus_write_byte_data(REG_CTRL_MEAS, CTRL_MEAS_FORCED)?;

        // Max conversion time at x1/x1/x1 is 9.3 ms.
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(3));
            if self.i2cdev.smbus_read_byte_data(REG_STATUS)? & STATUS_MEASURING == 0 {
                break;
            }
        }

        let d = self.i2cdev.smbus_read_i2c_block_data(REG_DATA, 8)?;
        if d.len() < 8 {
            return Err(SensorError::ShortRead { expected: 8, got: d.len() });
        }
        let adc_p = (i32::from(d[0]) << 12) | (i32::from(d[1]) << 4) | (i32::from(d[2]) >> 4);
        let adc_t = (i32::from(d[3]) << 12) | (i32::from(d[4]) << 4) | (i32::from(d[5]) >> 4);
        let adc_h = (i32::from(d[6]) << 8) | i32::from(d[7]);

        Ok(self.calibration.compensate(adc_t, adc_p, adc_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference calibration and ADC values from the Bosch BMP280/BME280
    // datasheet compensation example.
    fn reference() -> Calibration {
        Calibration {
            t1: 27504,
            t2: 26435,
            t3: -1000,
            p: [36477, -10685, 3024, 2855, 140, -7, 15500, -14600, 6000],
            h1: 75,
            h2: 362,
            h3: 0,
            h4: 324,
            h5: 50,
            h6: 30,
        }
    }

    #[test]
    fn temperature_matches_reference() {
        let (t, t_fine) = reference().compensate_temperature(519_888);
        assert_eq!(t, 2508);
        assert_eq!(t_fine, 128_422);
    }

    #[test]
    fn pressure_matches_reference() {
        let p = reference().compensate_pressure(415_148, 128_422);
        assert_eq!(p, 25_767_233);
    }

    #[test]
    fn humidity_is_plausible() {
        let h = reference().compensate_humidity(30_000, 128_422);
        assert_eq!(h, 52_306);
    }

    #[test]
    fn humidity_clamps_to_zero() {
        assert_eq!(reference().compensate_humidity(0, 128_422), 0);
    }

    #[test]
    fn compensate_converts_units() {
        let env = reference().compensate(519_888, 415_148, 30_000);
        assert!((env.temperature_c - 25.08).abs() < 0.001);
        assert!((env.pressure_hpa - 1006.53).abs() < 0.01);
        assert!((env.humidity_pct - 51.08).abs() < 0.01);
    }

    #[test]
    fn parse_splits_h4_h5_nibbles() {
        let tp = [0u8; 24];
        let h = [0x6A, 0x01, 0x00, 0x14, 0x24, 0x03, 0x1E];
        let cal = Calibration::parse(&tp, 75, &h).unwrap();
        assert_eq!(cal.h2, 362);
        assert_eq!(cal.h4, (0x14 << 4) | 0x4);
        assert_eq!(cal.h5, (0x03 << 4) | 0x2);
        assert_eq!(cal.h6, 30);
    }

    #[test]
    fn parse_rejects_short_blocks() {
        assert!(Calibration::parse(&[0u8; 10], 0, &[0u8; 7]).is_err());
        assert!(Calibration::parse(&[0u8; 24], 0, &[0u8; 3]).is_err());
    }
}
