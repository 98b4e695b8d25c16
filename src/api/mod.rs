pub mod dto;
pub mod handlers;

use axum::{routing::get, Router};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{alerts::subscriptions::Subscribers, snapshot_cache::SnapshotCache};

use handlers::ApiDoc;

/// Read-only view of the daemon, shared with the tick loop.
#[derive(Clone)]
pub struct AppState {
    pub cache: SnapshotCache,
    pub subscribers: Subscribers,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/status", get(handlers::get_status))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
