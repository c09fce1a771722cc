//! HTTP route entry point for `/api/...`.
//!
//! Route groups:
//! - `/health` → liveness probe (public)
//! - `/sync`, `/biometric-record` → device-facing endpoints, raw JSON
//! - `/devices` → device registry administration
//! - `/fingerprints` → template enrollment and removal
//! - `/attendance` → derivation runs, manual overrides, per-student stats
//! - `/check-records` → manual check entry and per-student listings
//! - `/events` → biometric event log queries

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use services::ServiceError;
use util::state::AppState;

use crate::response::ApiResponse;
use crate::routes::{
    attendance::attendance_routes, check_records::check_records_routes, devices::devices_routes,
    events::events_routes, fingerprints::fingerprints_routes, health::health_routes,
};

pub mod attendance;
pub mod check_records;
pub mod devices;
pub mod events;
pub mod fingerprints;
pub mod health;
pub mod sync;

/// Builds the complete application router for all HTTP endpoints.
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .nest("/health", health_routes())
        .route("/sync", post(sync::device_sync))
        .route("/biometric-record", post(sync::biometric_record))
        .nest("/devices", devices_routes())
        .nest("/fingerprints", fingerprints_routes())
        .nest("/attendance", attendance_routes())
        .nest("/check-records", check_records_routes())
        .nest("/events", events_routes())
        .with_state(app_state)
}

/// Maps a service error to the envelope the admin endpoints use.
pub(crate) fn error_response(err: ServiceError) -> Response {
    let status = match &err {
        ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::Sync(_) => StatusCode::BAD_GATEWAY,
        ServiceError::DataIntegrity(_) | ServiceError::Db(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed");
    }
    (
        status,
        Json(ApiResponse::<serde_json::Value>::error(err.to_string())),
    )
        .into_response()
}
