use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Indoor air-quality category.
///
/// Thresholds follow the Hong Kong Indoor Air Quality Management Group
/// guide; see `classifier` for the cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Good,
    Medium,
    Bad,
    /// No usable CO2/VOC values yet (warm-up or sensor failure).
    Unknown,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Good => "good",
            Classification::Medium => "medium",
            Classification::Bad => "bad",
            Classification::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Raw SGP30 calibration words as read back from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BaselineWords {
    pub eco2: u16,
    pub tvoc: u16,
}

/// A calibration baseline restored from (or written to) the config document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub words: BaselineWords,
    pub saved_at: DateTime<Utc>,
}

/// One sample of every attached sensor, taken once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    /// Equivalent CO2 in ppm. `None` when the air sensor has never answered.
    pub co2_ppm: Option<u16>,
    /// Total VOC in ppb.
    pub voc_ppb: Option<u16>,
    pub baseline: Option<BaselineWords>,
    /// Degrees Celsius
    pub temperature_c: Option<f32>,
    /// Relative humidity percentage
    pub humidity_pct: Option<f32>,
    pub pressure_hpa: Option<f32>,
    pub lux: f32,
    pub proximity: u16,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// A reading with no air-quality values, used before the first sample.
    pub fn unknown(timestamp: DateTime<Utc>) -> Self {
        Self {
            co2_ppm: None,
            voc_ppb: None,
            baseline: None,
            temperature_c: None,
            humidity_pct: None,
            pressure_hpa: None,
            lux: 0.0,
            proximity: 0,
            timestamp,
        }
    }
}

/// Latest outdoor conditions from IQAir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OutdoorSnapshot {
    /// US EPA AQI.
    pub aqi: u32,
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub pressure_hpa: Option<f32>,
    /// Measurement time reported by the station.
    pub measured_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

/// Everything downstream stages need from one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Snapshot {
    pub reading: Reading,
    pub classification: Classification,
    pub outdoor: Option<OutdoorSnapshot>,
}

impl Snapshot {
    pub fn aqi(&self) -> Option<u32> {
        self.outdoor.as_ref().map(|o| o.aqi)
    }
}
