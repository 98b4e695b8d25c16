use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Classification, Snapshot};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    /// `unknown` until the first sample has been classified.
    pub classification: Classification,
    /// Latest sample with its outdoor context. Absent right after startup.
    pub snapshot: Option<Snapshot>,
    /// Chats currently subscribed to alerts.
    pub subscribers: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
