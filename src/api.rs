pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod pages;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/pages/today", get(pages::today))
        .route("/v1/pages/{offset}", get(pages::page_at))
        .route("/v1/window", get(pages::window))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
