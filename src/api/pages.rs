use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::{
    app::AppState,
    nav::{error::WindowError, page::Page, period::DateKey},
};

#[derive(Debug, Serialize)]
pub(crate) struct PageResponse {
    offset: i64,
    key: DateKey,
    starts_at: DateTime<Utc>,
    page: Arc<Page>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WindowEntry {
    offset: i64,
    key: DateKey,
    starts_at: DateTime<Utc>,
    title: String,
    placeholder: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct WindowResponse {
    today: DateKey,
    history_len: usize,
    lookahead_len: usize,
    pages: Vec<WindowEntry>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_offset: Option<i64>,
}

pub(crate) struct ApiError(WindowError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            WindowError::OutOfWindow {
                offset,
                history_len,
                lookahead_len,
            } => {
                let body = ErrorBody {
                    error: format!("offset {offset} is outside the window"),
                    min_offset: Some(1 - i64::try_from(history_len).unwrap_or(i64::MAX)),
                    max_offset: Some(i64::try_from(lookahead_len).unwrap_or(i64::MAX)),
                };
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            other => {
                let body = ErrorBody {
                    error: other.to_string(),
                    min_offset: None,
                    max_offset: None,
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

/// 読み出し前に境界越えを確認する。失敗しても既存のウィンドウで応答する。
async fn advance_lazily(state: &AppState) {
    if let Err(error) = state.cache().advance(Utc::now()).await {
        warn!(error = %error, "lazy window advance failed; serving previous window");
    }
}

pub(crate) async fn today(State(state): State<AppState>) -> Result<Json<PageResponse>, ApiError> {
    render_page(&state, 0).await
}

pub(crate) async fn page_at(
    State(state): State<AppState>,
    Path(offset): Path<i64>,
) -> Result<Json<PageResponse>, ApiError> {
    render_page(&state, offset).await
}

async fn render_page(state: &AppState, offset: i64) -> Result<Json<PageResponse>, ApiError> {
    advance_lazily(state).await;

    let window = state.cache().snapshot().await;
    let page = window.page_at(offset).map_err(ApiError)?;
    let key = window.today().offset(offset);

    Ok(Json(PageResponse {
        offset,
        key,
        starts_at: state.cache().settings().period.start_of(key),
        page,
    }))
}

pub(crate) async fn window(State(state): State<AppState>) -> Json<WindowResponse> {
    advance_lazily(&state).await;

    let window = state.cache().snapshot().await;
    let period = state.cache().settings().period;
    let today = window.today();

    let pages = window
        .iter()
        .map(|(key, page)| WindowEntry {
            offset: key.periods_since(today),
            key,
            starts_at: period.start_of(key),
            title: page.title.clone(),
            placeholder: page.is_placeholder(),
        })
        .collect();

    Json(WindowResponse {
        today,
        history_len: window.history_len(),
        lookahead_len: window.lookahead_len(),
        pages,
    })
}
