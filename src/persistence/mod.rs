pub mod logbook;
pub mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeDelta, Utc};
use tracing::{info, warn};

use crate::{
    config::Language,
    messages,
    models::{BaselineWords, Reading},
    scheduler::Schedule,
    sensors::SensorSource,
};

use self::{
    logbook::{BASELINE_FILE, RESULT_FILE},
    settings::Settings,
};

pub const LOG_PERIOD_MINS: i64 = 10;
pub const VALID_PERIOD_HOURS: i64 = 1;
/// First valid write when no baseline could be restored: the SGP30 needs
/// 12 hours to establish a fresh one.
pub const FIRST_VALID_UNCALIBRATED_HOURS: i64 = 12;
pub const FIRST_VALID_RESTORED_HOURS: i64 = 1;

/// Owns the config document and the two logging cadences.
pub struct Persistence {
    settings: Settings,
    config_path: PathBuf,
    log_dir: PathBuf,
    log: Schedule,
    valid: Schedule,
}

impl Persistence {
    pub fn new(
        settings: Settings,
        config_path: PathBuf,
        log_dir: PathBuf,
        baseline_restored: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let first_valid = TimeDelta::hours(if baseline_restored {
            FIRST_VALID_RESTORED_HOURS
        } else {
            FIRST_VALID_UNCALIBRATED_HOURS
        });
        info!(
            first_valid_in_mins = first_valid.num_minutes(),
            "Baseline persistence scheduled"
        );
        Self {
            settings,
            config_path,
            log_dir,
            log: Schedule::every(now, TimeDelta::minutes(LOG_PERIOD_MINS)),
            valid: Schedule::starting_at(now + first_valid, TimeDelta::hours(VALID_PERIOD_HOURS)),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Append log lines and persist the baseline when their cadences are due.
    ///
    /// Log appends never fail; only rewriting the config document can.
    pub async fn tick(&mut self, reading: &Reading, now: DateTime<Utc>) -> Result<()> {
        let stamp = local_stamp(now);
        let log_due = self.log.poll(now);

        if log_due {
            logbook::append(&self.log_dir, RESULT_FILE, &reading_line(reading, &stamp)).await;
        }

        // No baseline read back yet: leave the valid cadence pending.
        let Some(words) = reading.baseline else {
            return Ok(());
        };

        if self.valid.poll(now) {
            let line = format!("Valid: {}", baseline_line(words, &stamp));
            logbook::append(&self.log_dir, BASELINE_FILE, &line).await;

            self.settings.sgp30_baseline.store(words, now);
            self.settings
                .save(&self.config_path)
                .await
                .context("failed to persist SGP30 baseline")?;
            info!(eco2 = words.eco2, tvoc = words.tvoc, "Baseline saved");
        } else if log_due {
            logbook::append(&self.log_dir, BASELINE_FILE, &baseline_line(words, &stamp)).await;
        }

        Ok(())
    }
}

/// Push the stored baseline to the SGP30 if it is recent enough. Returns
/// whether one was applied.
pub fn restore_baseline(
    sensors: &mut dyn SensorSource,
    settings: &Settings,
    now: DateTime<Utc>,
    language: Language,
) -> bool {
    let Some(baseline) = settings.sgp30_baseline.restore(now) else {
        info!("No recent SGP30 baseline, calibrating from scratch");
        return false;
    };
    let age = messages::relative_time(baseline.saved_at, now, language);
    match sensors.apply_baseline(baseline.words) {
        Ok(()) => {
            info!(
                eco2 = baseline.words.eco2,
                tvoc = baseline.words.tvoc,
                saved = %age,
                "SGP30 baseline restored"
            );
            true
        }
        Err(e) => {
            warn!(error = %e, "Failed to apply stored SGP30 baseline");
            false
        }
    }
}

fn local_stamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `CO2: 612 ppm, VOC: 33 ppb | 2026-10-14 10:00:00`
pub fn reading_line(reading: &Reading, stamp: &str) -> String {
    let show = |v: Option<u16>| v.map(|v| v.to_string()).unwrap_or_else(|| "--".to_owned());
    format!(
        "CO2: {} ppm, VOC: {} ppb | {stamp}",
        show(reading.co2_ppm),
        show(reading.voc_ppb)
    )
}

/// `CO2: 37934 0x942e, VOC: 38164 0x9514 | 2026-10-14 10:00:00`
pub fn baseline_line(words: BaselineWords, stamp: &str) -> String {
    format!(
        "CO2: {0} 0x{0:x}, VOC: {1} 0x{1:x} | {stamp}",
        words.eco2, words.tvoc
    )
}
