use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl HealthReport {
    fn ready() -> Self {
        Self {
            status: "ready",
            detail: None,
        }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: "degraded",
            detail: Some(detail.into()),
        }
    }
}

/// 境界を越えていればウィンドウを前進させ、現在の期間に追いついていれば ready。
///
/// 前進が失敗して古いウィンドウを配信している間だけ 503 を返す。
pub(crate) async fn ready(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    state.telemetry().record_ready_probe();

    let cache = state.cache();
    let now = Utc::now();

    if let Err(error) = cache.advance(now).await {
        warn!(error = %error, "window advance failed during readiness check");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport::degraded(format!("window advance: {error}"))),
        ));
    }

    let installed = cache.snapshot().await.today();
    let current = cache.settings().period.key_for(now);
    if installed < current {
        warn!(installed = %installed, current = %current, "window is behind the current period");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport::degraded(format!(
                "window today={installed} behind current={current}"
            ))),
        ));
    }

    Ok(Json(HealthReport::ready()))
}

pub(crate) async fn live(State(state): State<AppState>) -> Json<HealthReport> {
    state.telemetry().record_live_probe();
    Json(HealthReport {
        status: "live",
        detail: None,
    })
}
