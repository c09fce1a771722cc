//! Device registry administration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use services::devices::{DeviceRegistry, NewDevice};
use services::offline::OfflineEventQueue;
use util::state::AppState;

use crate::response::ApiResponse;
use crate::routes::error_response;

use db::models::device::DeviceState;

pub fn devices_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_devices).post(register_device))
        .route("/{device_id}", get(get_device).delete(remove_device))
        .route("/{device_id}/status", put(update_status))
        .route("/{device_id}/offline-events", get(pending_offline_events))
}

/// GET /api/devices
///
/// Every registered device with its slot occupancy counts.
async fn list_devices(State(state): State<AppState>) -> Response {
    match DeviceRegistry::list(state.db()).await {
        Ok(devices) => (
            StatusCode::OK,
            Json(ApiResponse::success(devices, "Devices retrieved successfully")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// POST /api/devices
async fn register_device(
    State(state): State<AppState>,
    Json(request): Json<NewDevice>,
) -> Response {
    match DeviceRegistry::register(state.db(), request).await {
        Ok(device) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(device, "Device registered successfully")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/devices/{device_id}
async fn get_device(State(state): State<AppState>, Path(device_id): Path<String>) -> Response {
    match DeviceRegistry::get(state.db(), &device_id).await {
        Ok(device) => (
            StatusCode::OK,
            Json(ApiResponse::success(device, "Device retrieved successfully")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct StatusUpdateRequest {
    state: DeviceState,
    current_address: Option<String>,
}

/// PUT /api/devices/{device_id}/status
async fn update_status(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Response {
    match DeviceRegistry::update_status(
        state.db(),
        &device_id,
        request.state,
        request.current_address.as_deref(),
    )
    .await
    {
        Ok(device) => (
            StatusCode::OK,
            Json(ApiResponse::success(device, "Device status updated")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// DELETE /api/devices/{device_id}
async fn remove_device(State(state): State<AppState>, Path(device_id): Path<String>) -> Response {
    match DeviceRegistry::remove(state.db(), &device_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success((), "Device removed successfully")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/devices/{device_id}/offline-events
///
/// Queue entries still waiting to be replayed to this device.
async fn pending_offline_events(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Response {
    match OfflineEventQueue::pending_for(state.db(), &device_id).await {
        Ok(events) => (
            StatusCode::OK,
            Json(ApiResponse::success(events, "Pending offline events retrieved")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}
