//! Router-level tests exercising the handlers end to end against an
//! in-memory database.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use db::test_utils::setup_test_db;
use serde_json::{Value, json};
use tower::util::ServiceExt;
use util::state::AppState;

use crate::routes::routes;

async fn test_app() -> (Router, AppState) {
    let db = setup_test_db().await;
    let state = AppState::new(db);
    (routes(state.clone()), state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn device_sync_registers_and_returns_raw_shape() {
    let (app, _state) = test_app().await;

    let response = app
        .oneshot(post_json("/sync", json!({ "device_id": "esp32-e2e" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    // raw device shape, not the admin envelope
    assert!(body.get("data").is_none());
    assert_eq!(body["success"], true);
    assert_eq!(body["device_id"], "esp32-e2e");
    assert_eq!(body["fingerprints"], json!([]));
    assert_eq!(body["devices_to_remove"], json!([]));
}

#[tokio::test]
async fn biometric_record_denies_unknown_fingerprint() {
    let (app, _state) = test_app().await;

    app.clone()
        .oneshot(post_json("/sync", json!({ "device_id": "esp32-e2e" })))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/biometric-record",
            json!({ "device_id": "esp32-e2e", "template_payload": "NOBODY" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "unauthorized");
}

#[tokio::test]
async fn device_registration_round_trip() {
    let (app, _state) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/devices",
            json!({
                "id": "esp32-lab",
                "name": "Lab entrance",
                "location": "Building A",
                "capacity": 64
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["capacity"], 64);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/devices/esp32-lab")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["id"], "esp32-lab");
}

#[tokio::test]
async fn missing_device_maps_to_not_found_envelope() {
    let (app, _state) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/devices/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn enroll_validation_is_rejected_with_422() {
    let (app, _state) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/fingerprints",
            json!({ "user_id": 1, "payload": "", "quality": 80 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn derive_requires_a_date_or_a_range() {
    let (app, _state) = test_app().await;

    let response = app
        .oneshot(post_json("/attendance/derive", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
