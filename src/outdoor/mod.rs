pub mod models;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, Url};
use tracing::{debug, error, info, warn};

use crate::{
    forwarder::DeliveryError,
    models::OutdoorSnapshot,
    persistence::settings::{IqAirSettings, Location},
    scheduler::Schedule,
};

use self::models::IqAirResponse;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct IqAirClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
    token: String,
    location: Location,
}

impl IqAirClient {
    pub fn new(base_url: &str, settings: &IqAirSettings, location: Location) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build IQAir HTTP client")?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_owned(),
                token: settings.token.clone(),
                location,
            }),
        })
    }

    /// Current conditions at the nearest IQAir station.
    pub async fn nearest_city(&self, now: DateTime<Utc>) -> Result<OutdoorSnapshot, DeliveryError> {
        let Location { latitude, longitude } = self.inner.location;
        let url = Url::parse_with_params(
            &format!("{}/v2/nearest_city", self.inner.base_url),
            &[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("key", self.inner.token.clone()),
            ],
        )
        .map_err(|e| DeliveryError::Permanent(format!("IQAir URL: {e}")))?;
        debug!(lat = latitude, lon = longitude, "Requesting IQAir nearest city");

        let resp = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, "IQAir request"))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, "IQAir response body"))?;

        // IQAir reports bad keys as 4xx with the usual envelope; prefer its message.
        let parsed = serde_json::from_slice::<IqAirResponse>(&bytes);
        let city = match parsed {
            Ok(body) => body.into_result()?,
            Err(_) if !status.is_success() => return Err(DeliveryError::from_status(status, "IQAir")),
            Err(e) => return Err(DeliveryError::Permanent(format!("IQAir payload: {e}"))),
        };

        let weather = city.current.weather;
        Ok(OutdoorSnapshot {
            aqi: city.current.pollution.aqius,
            temperature_c: weather.as_ref().and_then(|w| w.tp),
            humidity_pct: weather.as_ref().and_then(|w| w.hu),
            pressure_hpa: weather.as_ref().and_then(|w| w.pr),
            measured_at: city.current.pollution.ts,
            fetched_at: now,
        })
    }
}

/// Refreshes outdoor conditions on a fixed period and keeps the last good
/// value when a refresh fails.
pub struct OutdoorMonitor {
    client: Option<IqAirClient>,
    schedule: Schedule,
    latest: Option<OutdoorSnapshot>,
}

impl OutdoorMonitor {
    /// First fetch happens on the first tick.
    pub fn new(client: Option<IqAirClient>, now: DateTime<Utc>, period: TimeDelta) -> Self {
        if client.is_none() {
            info!("IQAir not configured, outdoor AQI disabled");
        }
        Self {
            client,
            schedule: Schedule::starting_at(now, period),
            latest: None,
        }
    }

    pub fn latest(&self) -> Option<&OutdoorSnapshot> {
        self.latest.as_ref()
    }

    /// Fetch if due. Failures are logged; the previous value stays.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        let Some(client) = &self.client else {
            return;
        };
        if !self.schedule.poll(now) {
            return;
        }
        match client.nearest_city(now).await {
            Ok(snapshot) => {
                info!(aqi = snapshot.aqi, measured_at = ?snapshot.measured_at, "Outdoor AQI updated");
                self.latest = Some(snapshot);
            }
            Err(e @ DeliveryError::Transient(_)) => {
                warn!(error = %e, "IQAir refresh failed, keeping previous value")
            }
            Err(e) => error!(error = %e, "IQAir refresh rejected, keeping previous value"),
        }
    }
}
