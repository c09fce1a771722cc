//! Device-facing endpoints.
//!
//! The firmware parses fixed JSON shapes and has no use for the admin
//! envelope, so these handlers return the raw device JSON directly. A
//! rejected scan gets a plain `401` whose body deliberately carries no
//! reason.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use services::checkin::CheckRecorder;
use services::sync::{SyncCoordinator, SyncRequest};
use tracing::error;
use util::state::AppState;

/// POST /api/sync
///
/// Full handshake for one device: uploads its offline backlog, replays the
/// queue and returns the complete desired slot contents.
pub async fn device_sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Response {
    let coordinator = SyncCoordinator::from_db(state.db_clone());
    match coordinator.handle_sync_request(&state, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            error!(error = %err, "device sync failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "sync failed" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BiometricRecordRequest {
    pub device_id: String,
    pub template_payload: String,
    pub confidence: Option<i32>,
    pub device_timestamp: Option<DateTime<Utc>>,
}

/// POST /api/biometric-record
///
/// One live fingerprint presentation. The response tells the device only
/// whether to open and what to display; every denial looks the same.
pub async fn biometric_record(
    State(state): State<AppState>,
    Json(request): Json<BiometricRecordRequest>,
) -> Response {
    let recorder = CheckRecorder::from_db(state.db_clone());
    match recorder
        .handle_biometric_record(
            &state,
            &request.device_id,
            &request.template_payload,
            request.confidence,
            request.device_timestamp,
        )
        .await
    {
        Ok(outcome) if outcome.authorized => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "user": outcome.user_name,
                "record_type": outcome.direction,
                "recorded_at": outcome.recorded_at,
            })),
        )
            .into_response(),
        Ok(_) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "success": false, "message": "unauthorized" })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "biometric record handling failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "record failed" })),
            )
                .into_response()
        }
    }
}
