//! Manual check entry and per-student check listings.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use db::models::raw_check_record::CheckDirection;
use serde::Deserialize;
use services::checkin::CheckRecorder;
use util::state::AppState;

use crate::response::ApiResponse;
use crate::routes::error_response;

pub fn check_records_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_manual))
        .route("/{user_id}", get(list_for_user))
}

#[derive(Debug, Deserialize)]
struct ManualCheckRequest {
    user_id: i64,
    /// Forced direction; omitted means alternate like a device check.
    direction: Option<CheckDirection>,
    recorded_at: DateTime<Utc>,
    actor_user_id: i64,
}

/// POST /api/check-records
///
/// Staff-entered check, audited and immediately reflected in the user's
/// attendance for that date.
async fn create_manual(
    State(state): State<AppState>,
    Json(request): Json<ManualCheckRequest>,
) -> Response {
    let recorder = CheckRecorder::from_db(state.db_clone());
    match recorder
        .record_manual(
            &state,
            request.user_id,
            request.direction,
            request.recorded_at,
            request.actor_user_id,
        )
        .await
    {
        Ok(record) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(record, "Check record saved")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

/// GET /api/check-records/{user_id}?from=...&to=...
async fn list_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Response {
    match CheckRecorder::list_for_user(state.db(), user_id, query.from, query.to).await {
        Ok(records) => (
            StatusCode::OK,
            Json(ApiResponse::success(records, "Check records retrieved")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}
