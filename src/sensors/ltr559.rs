//! Lite-On LTR-559 ambient light and proximity sensor.

use i2cdev::{core::I2CDevice, linux::LinuxI2CDevice};

use super::SensorError;

pub const LTR559_ADDRESS: u16 = 0x23;

const REG_ALS_CONTROL: u8 = 0x80;
const REG_PS_CONTROL: u8 = 0x81;
const REG_PS_LED: u8 = 0x82;
const REG_PS_N_PULSES: u8 = 0x83;
const REG_PS_MEAS_RATE: u8 = 0x84;
const REG_ALS_MEAS_RATE: u8 = 0x85;
const REG_PART_ID: u8 = 0x86;
const REG_ALS_DATA_CH1: u8 = 0x88;
const REG_PS_DATA: u8 = 0x8D;

const PART_NUMBER: u8 = 0x09;

/// ALS gain 4x, active mode.
const ALS_CONTROL_ACTIVE_GAIN4: u8 = (0b010 << 2) | 0b1;
/// PS active mode with saturation indicator.
const PS_CONTROL_ACTIVE: u8 = 0b0010_0011;
/// 30 kHz pulses, 100 % duty cycle, 50 mA.
const PS_LED_DEFAULT: u8 = (0b000 << 5) | (0b11 << 3) | 0b011;
/// 100 ms proximity measurement rate.
const PS_MEAS_RATE_100MS: u8 = 0x02;
/// 50 ms integration, 50 ms repeat.
const ALS_MEAS_RATE_50MS: u8 = 0b001 << 3;

const ALS_GAIN: f32 = 4.0;
const ALS_INTEGRATION_MS: f32 = 50.0;

// Lux coefficients per channel ratio band (LTR-559 appendix A).
const CH0_COEFF: [i64; 4] = [17743, 42785, 5926, 0];
const CH1_COEFF: [i64; 4] = [-11059, 19548, -1185, 0];

pub struct Ltr559 {
    i2cdev: LinuxI2CDevice,
}

impl Ltr559 {
    pub fn open(bus: &str) -> Result<Self, SensorError> {
        let mut i2cdev = LinuxI2CDevice::new(bus, LTR559_ADDRESS)?;

        let part_id = i2cdev.smbus_read_byte_data(REG_PART_ID)?;
        if part_id >> 4 != PART_NUMBER {
            return Err(SensorError::UnexpectedId { sensor: "LTR559", id: part_id });
        }

        i2cdev.smbus_write_byte_data(REG_ALS_CONTROL, ALS_CONTROL_ACTIVE_GAIN4)?;
        i2cdev.smbus_write_byte_data(REG_PS_CONTROL, PS_CONTROL_ACTIVE)?;
        i2cdev.smbus_write_byte_data(REG_PS_LED, PS_LED_DEFAULT)?;
        i2cdev.smbus_write_byte_data(REG_PS_N_PULSES, 1)?;
        i2cdev.smbus_write_byte_data(REG_PS_MEAS_RATE, PS_MEAS_RATE_100MS)?;
        i2cdev.smbus_write_byte_data(REG_ALS_MEAS_RATE, ALS_MEAS_RATE_50MS)?;

        Ok(Self { i2cdev })
    }

    /// Read both channels and the proximity counter. Returns `(lux, proximity)`.
    pub fn update(&mut self) -> Result<(f32, u16), SensorError> {
        let als = self.i2cdev.smbus_read_i2c_block_data(REG_ALS_DATA_CH1, 4)?;
        let ps = self.i2cdev.smbus_read_i2c_block_data(REG_PS_DATA, 2)?;
        if als.len() < 4 {
            return Err(SensorError::ShortRead { expected: 4, got: als.len() });
        }
        if ps.len() < 2 {
            return Err(SensorError::ShortRead { expected: 2, got: ps.len() });
        }

        let ch1 = u16::from_le_bytes([als[0], als[1]]);
        let ch0 = u16::from_le_bytes([als[2], als[3]]);
        Ok((lux(ch0, ch1), proximity(ps[0], ps[1])))
    }
}

/// Convert raw ALS channel counts to lux.
pub fn lux(ch0: u16, ch1: u16) -> f32 {
    let (ch0, ch1) = (i64::from(ch0), i64::from(ch1));
    let ratio = if ch0 + ch1 > 0 { ch1 * 1000 / (ch0 + ch1) } else { 1000 };
    let band = match ratio {
        r if r < 450 => 0,
        r if r < 640 => 1,
        r if r < 850 => 2,
        _ => 3,
    };
    let raw = ch0 * CH0_COEFF[band] - ch1 * CH1_COEFF[band];
    let lux = raw as f32 / (ALS_INTEGRATION_MS / 100.0) / ALS_GAIN / 10000.0;
    lux.max(0.0)
}

/// 11-bit proximity count; bit 7 of the high byte is the saturation flag.
pub fn proximity(low: u8, high: u8) -> u16 {
    (u16::from(high & 0x07) << 8) | u16::from(low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dark_is_zero_lux() {
        assert_eq!(lux(0, 0), 0.0);
    }

    #[test]
    fn visible_light_band() {
        // ratio = 100 / 1100 → band 0
        let l = lux(1000, 100);
        let expected = (1000.0 * 17743.0 + 100.0 * 11059.0) / 0.5 / 4.0 / 10000.0;
        assert!((l - expected).abs() < 0.01, "got {l}");
    }

    #[test]
    fn infrared_heavy_band_is_zero() {
        // ratio >= 850 → band 3, all coefficients zero
        assert_eq!(lux(10, 990), 0.0);
    }

    #[test]
    fn middle_bands_never_negative() {
        for (ch0, ch1) in [(500, 500), (300, 700), (100, 200)] {
            assert!(lux(ch0, ch1) >= 0.0);
        }
    }

    #[test]
    fn proximity_masks_saturation_bit() {
        assert_eq!(proximity(0x34, 0x82), 0x234);
        assert_eq!(proximity(0xFF, 0x07), 2047);
        assert_eq!(proximity(5, 0), 5);
    }
}
