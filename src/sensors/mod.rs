pub mod bme280;
pub mod ltr559;
pub mod sgp30;

use chrono::{DateTime, Utc};
use i2cdev::linux::LinuxI2CError;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{BaselineWords, Reading};

use self::{bme280::Bme280, ltr559::Ltr559, sgp30::Sgp30};

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("i2c: {0}")]
    I2c(#[from] LinuxI2CError),
    #[error("checksum mismatch in sensor response")]
    Checksum,
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("{sensor} reported unexpected id 0x{id:02x}")]
    UnexpectedId { sensor: &'static str, id: u8 },
}

/// Anything that can produce a `Reading` once per tick.
pub trait SensorSource: Send {
    /// Never fails: on I/O errors the implementation falls back to
    /// last-known values or an unknown reading.
    fn sample(&mut self, now: DateTime<Utc>) -> Reading;

    /// Push a restored calibration baseline to the air sensor.
    fn apply_baseline(&mut self, baseline: BaselineWords) -> Result<(), SensorError>;
}

/// The board's sensor set: SGP30 (required), LTR559 and BME280 (optional).
pub struct SensorReader {
    sgp30: Sgp30,
    ltr559: Option<Ltr559>,
    bme280: Option<Bme280>,
    last_air: Option<(u16, u16)>,
    last_baseline: Option<BaselineWords>,
    last_light: (f32, u16),
}

impl SensorReader {
    pub fn open(bus: &str, with_bme280: bool) -> Result<Self, SensorError> {
        let mut sgp30 = Sgp30::open(bus)?;
        match sgp30.serial() {
            Ok(serial) => info!(serial = ?serial, "SGP30 found"),
            Err(e) => warn!(error = %e, "Could not read SGP30 serial"),
        }
        sgp30.iaq_init()?;

        let ltr559 = match Ltr559::open(bus) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "LTR559 unavailable, proximity wake disabled");
                None
            }
        };

        let bme280 = if with_bme280 {
            match Bme280::open(bus) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(error = %e, "BME280 unavailable, no temperature or humidity");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            sgp30,
            ltr559,
            bme280,
            last_air: None,
            last_baseline: None,
            last_light: (0.0, 0),
        })
    }
}

impl SensorSource for SensorReader {
    /// The chips need tens of milliseconds between command and response, so
    /// the read runs through `block_in_place`. Requires the multi-thread
    /// runtime.
    fn sample(&mut self, now: DateTime<Utc>) -> Reading {
        tokio::task::block_in_place(|| self.read_all(now))
    }

    fn apply_baseline(&mut self, baseline: BaselineWords) -> Result<(), SensorError> {
        self.sgp30.set_iaq_baseline(baseline)
    }
}

impl SensorReader {
    fn read_all(&mut self, now: DateTime<Utc>) -> Reading {
        let environment = self.bme280.as_mut().and_then(|s| match s.measure() {
            Ok(env) => Some(env),
            Err(e) => {
                warn!(error = %e, "BME280 read failed");
                None
            }
        });

        if let Some(env) = environment {
            let ah = sgp30::absolute_humidity(env.temperature_c, env.humidity_pct);
            if let Err(e) = self.sgp30.set_absolute_humidity(ah) {
                warn!(error = %e, "SGP30 humidity compensation failed");
            }
        }

        match self.sgp30.measure_iaq() {
            Ok(m) => self.last_air = Some((m.eco2_ppm, m.tvoc_ppb)),
            Err(e) => warn!(error = %e, "SGP30 read failed, reusing last-known values"),
        }
        match self.sgp30.get_iaq_baseline() {
            Ok(b) => self.last_baseline = Some(b),
            Err(e) => warn!(error = %e, "SGP30 baseline read failed"),
        }

        if let Some(ltr) = self.ltr559.as_mut() {
            match ltr.update() {
                Ok(light) => self.last_light = light,
                Err(e) => warn!(error = %e, "LTR559 read failed, reusing last-known values"),
            }
        }

        Reading {
            co2_ppm: self.last_air.map(|(co2, _)| co2),
            voc_ppb: self.last_air.map(|(_, voc)| voc),
            baseline: self.last_baseline,
            temperature_c: environment.map(|e| e.temperature_c),
            humidity_pct: environment.map(|e| e.humidity_pct),
            pressure_hpa: environment.map(|e| e.pressure_hpa),
            lux: self.last_light.0,
            proximity: self.last_light.1,
            timestamp: now,
        }
    }
}
