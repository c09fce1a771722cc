//! Template enrollment and removal.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use services::templates::{NewTemplate, TemplateStore};
use util::state::AppState;
use validator::Validate;

use crate::response::ApiResponse;
use crate::routes::error_response;

pub fn fingerprints_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(enroll))
        .route("/{template_id}", delete(remove))
        .route("/user/{user_id}", get(list_for_user).delete(remove_for_user))
}

#[derive(Debug, Deserialize, Validate)]
struct EnrollRequest {
    user_id: i64,
    #[validate(length(min = 1, message = "payload must not be empty"))]
    payload: String,
    #[validate(range(min = 0, max = 100, message = "quality must be between 0 and 100"))]
    quality: i32,
    origin_device: Option<String>,
}

/// POST /api/fingerprints
///
/// Stores a template and distributes it across the fleet. Partial
/// distribution is still a success; skipped devices are listed in
/// `unresolved_devices`.
async fn enroll(State(state): State<AppState>, Json(request): Json<EnrollRequest>) -> Response {
    if let Err(errors) = request.validate() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::<serde_json::Value>::error(errors.to_string())),
        )
            .into_response();
    }

    let new = NewTemplate {
        user_id: request.user_id,
        payload: request.payload,
        quality: request.quality,
        origin_device: request.origin_device,
    };
    match TemplateStore::enroll(&state, new).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(outcome, "Template enrolled successfully")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// DELETE /api/fingerprints/{template_id}
async fn remove(State(state): State<AppState>, Path(template_id): Path<i64>) -> Response {
    match TemplateStore::delete(&state, template_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success((), "Template scheduled for removal")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/fingerprints/user/{user_id}
async fn list_for_user(State(state): State<AppState>, Path(user_id): Path<i64>) -> Response {
    match TemplateStore::list_for_user(state.db(), user_id).await {
        Ok(templates) => (
            StatusCode::OK,
            Json(ApiResponse::success(templates, "Templates retrieved successfully")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// DELETE /api/fingerprints/user/{user_id}
async fn remove_for_user(State(state): State<AppState>, Path(user_id): Path<i64>) -> Response {
    match TemplateStore::delete_for_user(&state, user_id).await {
        Ok(count) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                serde_json::json!({ "deactivated": count }),
                "Templates scheduled for removal",
            )),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}
