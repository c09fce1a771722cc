//! Attendance derivation runs, manual overrides and per-student statistics.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use db::models::attendance_record::AttendanceStatus;
use serde::Deserialize;
use services::ServiceError;
use services::attendance::{self, AttendanceDeriver};
use services::collab::{DbScheduleProvider, DbUserDirectory};
use util::state::AppState;

use crate::response::ApiResponse;
use crate::routes::error_response;

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/derive", post(derive))
        .route("/manual", post(manual))
        .route("/stats/{user_id}", get(stats))
}

#[derive(Debug, Deserialize)]
struct DeriveRequest {
    date: Option<NaiveDate>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

/// POST /api/attendance/derive
///
/// Recomputes attendance for every student, either for one `date` or for an
/// inclusive `from`/`to` range.
async fn derive(State(state): State<AppState>, Json(request): Json<DeriveRequest>) -> Response {
    let deriver = AttendanceDeriver::from_config();
    let users = DbUserDirectory::new(state.db_clone());
    let schedule = DbScheduleProvider::new(state.db_clone());

    let result = match (request.date, request.from, request.to) {
        (Some(date), None, None) => deriver.run_for_date(&state, &users, &schedule, date).await,
        (None, Some(from), Some(to)) => {
            deriver
                .run_for_range(&state, &users, &schedule, from, to)
                .await
        }
        _ => Err(ServiceError::validation(
            "provide either date, or from and to",
        )),
    };

    match result {
        Ok(run_stats) => (
            StatusCode::OK,
            Json(ApiResponse::success(run_stats, "Attendance derivation completed")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct ManualRequest {
    user_id: i64,
    class_session_id: i64,
    date: NaiveDate,
    status: AttendanceStatus,
    notes: Option<String>,
}

/// POST /api/attendance/manual
///
/// Writes a manual attendance row, e.g. an excused absence. Manual rows are
/// never overwritten by later derivation runs.
async fn manual(State(state): State<AppState>, Json(request): Json<ManualRequest>) -> Response {
    match attendance::record_manual(
        &state,
        request.user_id,
        request.class_session_id,
        request.date,
        request.status,
        request.notes,
    )
    .await
    {
        Ok(row) => (
            StatusCode::OK,
            Json(ApiResponse::success(row, "Attendance record saved")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    from: NaiveDate,
    to: NaiveDate,
}

/// GET /api/attendance/stats/{user_id}?from=...&to=...
async fn stats(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<StatsQuery>,
) -> Response {
    match attendance::student_stats(&state, user_id, query.from, query.to).await {
        Ok(student_stats) => (
            StatusCode::OK,
            Json(ApiResponse::success(student_stats, "Attendance stats retrieved")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}
