use std::{path::PathBuf, str::FromStr};

use anyhow::{Context, Result};

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Language used for chat replies, alerts and relative times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Spanish,
    English,
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "es" => Ok(Self::Spanish),
            "en" => Ok(Self::English),
            other => Err(anyhow::anyhow!("unknown language: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Process-level settings read from the environment.
///
/// Credentials, location and the SGP30 baseline live in the JSON config
/// document instead (see `persistence::settings`).
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub log_dir: PathBuf,
    pub i2c_bus: String,
    pub enable_bme280: bool,
    /// Framebuffer device of the LCD. `None` runs headless.
    pub display_fb: Option<PathBuf>,
    /// sysfs `bl_power` file of the LCD backlight.
    pub display_backlight: Option<PathBuf>,
    pub proximity_threshold: u16,
    /// Seconds the screen stays on after the last proximity hit.
    pub screen_timeout_secs: u32,
    pub forward_warmup_secs: u64,
    pub forward_interval_secs: u64,
    pub outdoor_refresh_secs: u64,
    pub good_alert_ticks: u32,
    pub bad_alert_ticks: u32,
    /// Interface whose hardware address namespaces the MQTT topics.
    pub net_interface: String,
    pub language: Language,
    pub iqair_base_url: String,
    pub adafruit_base_url: String,
    pub telegram_base_url: String,
    pub api_enabled: bool,
    pub server_host: String,
    pub server_port: u16,
    pub process_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config_path: optional("CALCIFER_CONFIG", "config.json").into(),
            log_dir: optional("LOG_DIR", "logs").into(),
            i2c_bus: optional("I2C_BUS", "/dev/i2c-1"),
            enable_bme280: parse_bool("ENABLE_BME280", &optional("ENABLE_BME280", "false"))?,
            display_fb: non_empty(optional("DISPLAY_FB", "/dev/fb1")).map(PathBuf::from),
            display_backlight: non_empty(optional("DISPLAY_BACKLIGHT", "")).map(PathBuf::from),
            proximity_threshold: optional("PROXIMITY_THRESHOLD", "5")
                .parse()
                .context("PROXIMITY_THRESHOLD must be a non-negative integer")?,
            screen_timeout_secs: optional("SCREEN_TIMEOUT_SECS", "5")
                .parse()
                .context("SCREEN_TIMEOUT_SECS must be a non-negative integer")?,
            forward_warmup_secs: optional("FORWARD_WARMUP_SECS", "900")
                .parse()
                .context("FORWARD_WARMUP_SECS must be a non-negative integer")?,
            forward_interval_secs: optional("FORWARD_INTERVAL_SECS", "30")
                .parse()
                .context("FORWARD_INTERVAL_SECS must be a positive integer")?,
            outdoor_refresh_secs: optional("OUTDOOR_REFRESH_SECS", "1800")
                .parse()
                .context("OUTDOOR_REFRESH_SECS must be a positive integer")?,
            good_alert_ticks: optional("GOOD_ALERT_TICKS", "30")
                .parse()
                .context("GOOD_ALERT_TICKS must be a positive integer")?,
            bad_alert_ticks: optional("BAD_ALERT_TICKS", "1800")
                .parse()
                .context("BAD_ALERT_TICKS must be a positive integer")?,
            net_interface: optional("NET_INTERFACE", "wlan0"),
            language: optional("LANGUAGE", "es")
                .parse()
                .context("LANGUAGE must be 'es' or 'en'")?,
            iqair_base_url: optional("IQAIR_BASE_URL", "https://api.airvisual.com"),
            adafruit_base_url: optional("ADAFRUIT_BASE_URL", "https://io.adafruit.com"),
            telegram_base_url: optional("TELEGRAM_BASE_URL", "https://api.telegram.org"),
            api_enabled: parse_bool("API_ENABLED", &optional("API_ENABLED", "false"))?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            process_name: optional("PROCESS_NAME", "calcifer"),
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow::anyhow!("{key} must be a boolean, got: {other:?}")),
    }
}

fn non_empty(s: String) -> Option<String> {
    let s = s.trim().to_owned();
    (!s.is_empty()).then_some(s)
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
