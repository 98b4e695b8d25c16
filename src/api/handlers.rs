use axum::{extract::State, Json};
use utoipa::OpenApi;

use super::{
    dto::{HealthResponse, StatusResponse},
    AppState,
};
use crate::models::{
    BaselineWords, Classification, OutdoorSnapshot, Reading, Snapshot,
};

/// Latest classified sample and the number of alert subscribers.
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Current air quality", body = StatusResponse),
    ),
    tag = "air"
)]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.cache.latest().await;
    let classification = snapshot
        .as_ref()
        .map_or(Classification::Unknown, |s| s.classification);
    Json(StatusResponse {
        classification,
        snapshot,
        subscribers: state.subscribers.len().await,
    })
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Daemon is running", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
    })
}

// ---------------------------------------------------------------------------
// OpenAPI document (used in api/mod.rs)
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(get_status, health),
    components(schemas(
        StatusResponse,
        HealthResponse,
        Snapshot,
        Reading,
        OutdoorSnapshot,
        BaselineWords,
        Classification
    )),
    tags(
        (name = "air",    description = "Indoor air quality"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "Calcifer API",
        version = "0.1.0",
        description = "Read-only status of the Calcifer air-quality daemon"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
