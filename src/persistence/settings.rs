use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::fs;

use crate::models::{Baseline, BaselineWords};

/// Stored baselines older than this many days are ignored at startup.
pub const BASELINE_MAX_AGE_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Document sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub token: String,
    #[serde(default)]
    pub authorized_user_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdafruitSettings {
    pub username: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IqAirSettings {
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttSettings {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBaseline {
    #[serde(default, alias = "eCO2")]
    pub eco2: Option<u16>,
    #[serde(default, alias = "TVOC")]
    pub tvoc: Option<u16>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl StoredBaseline {
    /// The stored baseline, if complete and younger than `BASELINE_MAX_AGE_DAYS`.
    pub fn restore(&self, now: DateTime<Utc>) -> Option<Baseline> {
        let (eco2, tvoc, saved_at) = (self.eco2?, self.tvoc?, self.timestamp?);
        (now < saved_at + TimeDelta::days(BASELINE_MAX_AGE_DAYS)).then_some(Baseline {
            words: BaselineWords { eco2, tvoc },
            saved_at,
        })
    }

    pub fn store(&mut self, words: BaselineWords, now: DateTime<Utc>) {
        self.eco2 = Some(words.eco2);
        self.tvoc = Some(words.tvoc);
        self.timestamp = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Settings document
// ---------------------------------------------------------------------------

/// The JSON config document. A missing section disables that integration.
///
/// Keys this daemon does not know about are kept in `extra` so that a
/// rewrite never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adafruit: Option<AdafruitSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iqair: Option<IqAirSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<MqttSettings>,
    #[serde(default)]
    pub sgp30_baseline: StoredBaseline,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        let bytes = fs::read(path).await.map_err(|source| SettingsError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_slice(path, &bytes)
    }

    pub fn from_slice(path: &Path, bytes: &[u8]) -> Result<Self, SettingsError> {
        serde_json::from_slice(bytes).map_err(|source| SettingsError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Rewrite the whole document: write a sibling temp file, then rename
    /// it over the original.
    pub async fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let content = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        let write_err = |source| SettingsError::Write {
            path: path.to_owned(),
            source,
        };
        fs::write(&tmp, &content).await.map_err(write_err)?;
        fs::rename(&tmp, path).await.map_err(write_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn stored(saved_at: DateTime<Utc>) -> StoredBaseline {
        StoredBaseline {
            eco2: Some(0x942e),
            tvoc: Some(0x9514),
            timestamp: Some(saved_at),
        }
    }

    #[test]
    fn baseline_three_days_old_is_restored() {
        let b = stored(t0() - TimeDelta::days(3)).restore(t0()).unwrap();
        assert_eq!(b.words, BaselineWords { eco2: 0x942e, tvoc: 0x9514 });
        assert_eq!(b.saved_at, t0() - TimeDelta::days(3));
    }

    #[test]
    fn baseline_ten_days_old_is_discarded() {
        assert!(stored(t0() - TimeDelta::days(10)).restore(t0()).is_none());
    }

    #[test]
    fn incomplete_baseline_is_discarded() {
        let mut s = stored(t0());
        s.tvoc = None;
        assert!(s.restore(t0()).is_none());
        assert!(StoredBaseline::default().restore(t0()).is_none());
    }

    #[test]
    fn parses_full_document() {
        let raw = br#"{
            "telegram": {"token": "123:abc", "authorized_user_ids": [42, 7]},
            "adafruit": {"username": "calcifer", "key": "aio_x"},
            "iqair": {"token": "iq"},
            "location": {"latitude": 40.41, "longitude": -3.70},
            "mqtt": {"host": "homeassistant.local"},
            "sgp30_baseline": {"eCO2": 37934, "TVOC": 38164, "timestamp": "2026-10-10T08:00:00Z"}
        }"#;
        let s = Settings::from_slice(Path::new("config.json"), raw).unwrap();
        assert_eq!(s.telegram.unwrap().authorized_user_ids, vec![42, 7]);
        assert_eq!(s.mqtt.unwrap().port, 1883);
        assert_eq!(s.sgp30_baseline.eco2, Some(37934));
        assert_eq!(s.location.unwrap().latitude, 40.41);
    }

    #[test]
    fn missing_sections_are_none() {
        let s = Settings::from_slice(Path::new("config.json"), b"{}").unwrap();
        assert!(s.telegram.is_none());
        assert!(s.adafruit.is_none());
        assert_eq!(s.sgp30_baseline, StoredBaseline::default());
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = Settings::from_slice(Path::new("broken.json"), b"{not json").unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn save_preserves_unknown_keys() {
        let dir = std::env::temp_dir().join(format!("calcifer-settings-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, br#"{"favourite_colour": "orange", "sgp30_baseline": {}}"#).unwrap();

        let mut s = Settings::load(&path).await.unwrap();
        s.sgp30_baseline.store(BaselineWords { eco2: 1, tvoc: 2 }, t0());
        s.save(&path).await.unwrap();

        let reloaded = Settings::load(&path).await.unwrap();
        assert_eq!(reloaded.extra["favourite_colour"], "orange");
        assert_eq!(reloaded.sgp30_baseline.tvoc, Some(2));
        assert_eq!(reloaded.sgp30_baseline.timestamp, Some(t0()));
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
