//! Biometric event log queries.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use services::events::EventRecorder;
use util::state::AppState;

use crate::response::ApiResponse;
use crate::routes::error_response;

pub fn events_routes() -> Router<AppState> {
    Router::new()
        .route("/flagged", get(list_flagged))
        .route("/device/{device_id}", get(list_for_device))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<u64>,
}

/// GET /api/events/flagged
///
/// Security-flagged events, newest first.
async fn list_flagged(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Response {
    match EventRecorder::list_flagged(state.db(), query.limit.unwrap_or(100)).await {
        Ok(events) => (
            StatusCode::OK,
            Json(ApiResponse::success(events, "Flagged events retrieved")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/events/device/{device_id}
async fn list_for_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    match EventRecorder::list_for_device(state.db(), &device_id, query.limit.unwrap_or(100)).await {
        Ok(events) => (
            StatusCode::OK,
            Json(ApiResponse::success(events, "Device events retrieved")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}
