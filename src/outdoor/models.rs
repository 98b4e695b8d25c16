use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::forwarder::DeliveryError;

// ---------------------------------------------------------------------------
// Response envelope
//
// Success:
//   { "status": "success", "data": { "city": "...", "current": { ... } } }
//
// Failure:
//   { "status": "fail", "data": { "message": "incorrect_api_key" } }
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IqAirResponse {
    pub status: String,
    #[serde(default)]
    pub data: Value,
}

impl IqAirResponse {
    /// Any status other than `success` is an API-level rejection.
    pub fn into_result(self) -> Result<NearestCity, DeliveryError> {
        if self.status != "success" {
            let message = self.data["message"].as_str().unwrap_or("(no message)");
            return Err(DeliveryError::Permanent(format!(
                "IQAir status={}, message={message}",
                self.status
            )));
        }
        serde_json::from_value(self.data)
            .map_err(|e| DeliveryError::Permanent(format!("IQAir payload: {e}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct NearestCity {
    pub city: Option<String>,
    pub current: Current,
}

#[derive(Debug, Deserialize)]
pub struct Current {
    pub pollution: Pollution,
    pub weather: Option<Weather>,
}

#[derive(Debug, Deserialize)]
pub struct Pollution {
    pub ts: Option<DateTime<Utc>>,
    /// US EPA AQI.
    pub aqius: u32,
}

#[derive(Debug, Deserialize)]
pub struct Weather {
    /// °C
    pub tp: Option<f32>,
    /// %
    pub hu: Option<f32>,
    /// hPa
    pub pr: Option<f32>,
}
