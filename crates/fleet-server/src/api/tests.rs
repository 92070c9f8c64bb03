use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::{api, config::Config, service::FleetService};

async fn setup_app() -> Router {
    let mut config = Config::default();
    config.database_path = std::env::temp_dir()
        .join(format!("fleet-api-test-{}.db", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    config.database_max_connections = 4;

    let fleet = FleetService::connect(&config).await.expect("init fleet");
    api::routes().with_state(Arc::new(fleet))
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return (status, Value::Null);
    }
    (status, read_json(response).await)
}

/// Creates Alice, drone ABC123 and a waiting task. Returns (user, drone, task) ids.
async fn seed(app: &Router) -> (i64, i64, i64) {
    let (status, user) = send(app, "POST", "/v1/users", Some(json!({"name": "Alice"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = user["id"].as_i64().unwrap();

    let (status, drone) = send(
        app,
        "POST",
        "/v1/drones",
        Some(json!({"hardware_id": "ABC123", "owner_id": user_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let drone_id = drone["id"].as_i64().unwrap();

    let (status, task) = send(
        app,
        "POST",
        "/v1/tasks",
        Some(json!({
            "user_id": user_id,
            "drone_id": drone_id,
            "start": {"lat": 0.0, "lon": 0.0},
            "end": {"lat": 1.0, "lon": 1.0},
            "description": "parcel"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["status"], "waiting");

    (user_id, drone_id, task["id"].as_i64().unwrap())
}

fn telemetry(status: &str) -> Value {
    json!({
        "velocity": {"x": 0.0, "y": 0.0, "z": 0.0},
        "gps": {"lat": 1.0, "lon": 1.0},
        "altitude_m": 0.0,
        "battery": 64,
        "status": status
    })
}

#[tokio::test]
async fn health_check_responds() {
    let app = setup_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn assign_then_land_completes_task() {
    let app = setup_app().await;
    let (_, drone_id, task_id) = seed(&app).await;

    let (status, task) = send(&app, "POST", &format!("/v1/tasks/{task_id}/assign"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "ongoing");

    let (_, drone) = send(&app, "GET", &format!("/v1/drones/{drone_id}"), None).await;
    assert_eq!(drone["flight_status"], "ongoing");
    assert_eq!(drone["current_task_id"], task_id);

    let (status, drone) = send(
        &app,
        "PUT",
        &format!("/v1/drones/{drone_id}/telemetry"),
        Some(telemetry("landed")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drone["flight_status"], "completed");
    assert_eq!(drone["current_task_id"], Value::Null);
    assert_eq!(drone["battery"], 64);

    let (_, task) = send(&app, "GET", &format!("/v1/tasks/{task_id}"), None).await;
    assert_eq!(task["status"], "completed");
}

#[tokio::test]
async fn invalid_transition_maps_to_bad_request() {
    let app = setup_app().await;
    let (_, _, task_id) = seed(&app).await;

    let (status, body) =
        send(&app, "POST", &format!("/v1/tasks/{task_id}/complete"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "invalid_transition");
    assert!(body["message"].as_str().unwrap().contains("waiting"));
}

#[tokio::test]
async fn flying_without_task_is_rejected() {
    let app = setup_app().await;
    let (_, drone_id, _) = seed(&app).await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/v1/drones/{drone_id}/telemetry"),
        Some(telemetry("flying")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "invalid_transition");
}

#[tokio::test]
async fn unknown_entities_return_not_found() {
    let app = setup_app().await;

    let (status, body) = send(&app, "GET", "/v1/drones/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_kind"], "not_found");

    let (status, _) = send(&app, "POST", "/v1/tasks/999/assign", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", "/v1/users/nobody", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_hardware_id_is_conflict() {
    let app = setup_app().await;
    seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/drones",
        Some(json!({"hardware_id": "ABC123"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_kind"], "conflict");
}

#[tokio::test]
async fn busy_drone_cannot_be_deleted() {
    let app = setup_app().await;
    let (_, drone_id, task_id) = seed(&app).await;
    send(&app, "POST", &format!("/v1/tasks/{task_id}/assign"), None).await;

    let (status, _) = send(&app, "DELETE", &format!("/v1/drones/{drone_id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", &format!("/v1/tasks/{task_id}/abort"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "DELETE", &format!("/v1/drones/{drone_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The task record outlives its drone.
    let (status, task) = send(&app, "GET", &format!("/v1/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "aborted");
    assert_eq!(task["drone_id"], drone_id);
}

#[tokio::test]
async fn delete_user_by_name_keeps_drones() {
    let app = setup_app().await;
    let (_, drone_id, _) = seed(&app).await;

    let (status, _) = send(&app, "DELETE", "/v1/users/Alice", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, drone) = send(&app, "GET", &format!("/v1/drones/{drone_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drone["owner_id"], Value::Null);

    let (_, names) = send(&app, "GET", "/v1/users/names", None).await;
    assert_eq!(names, json!([]));
}

#[tokio::test]
async fn drone_listing_filters() {
    let app = setup_app().await;
    let (_, drone_id, task_id) = seed(&app).await;
    send(&app, "POST", &format!("/v1/tasks/{task_id}/assign"), None).await;

    let (status, flying) = send(&app, "GET", "/v1/drones?flight_status=flying", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flying.as_array().unwrap().len(), 1);
    assert_eq!(flying[0]["id"], drone_id);

    let (_, by_task) = send(&app, "GET", "/v1/drones?task_status=ongoing", None).await;
    assert_eq!(by_task.as_array().unwrap().len(), 1);

    let (_, idle) = send(&app, "GET", "/v1/drones?flight_status=waiting", None).await;
    assert!(idle.as_array().unwrap().is_empty());

    let (_, owned) = send(&app, "GET", "/v1/users/by-name/Alice/drones", None).await;
    assert_eq!(owned.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        "GET",
        "/v1/drones?flight_status=waiting&task_status=ongoing",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, ongoing) = send(&app, "GET", "/v1/tasks?status=ongoing", None).await;
    assert_eq!(ongoing[0]["id"], task_id);
}

#[tokio::test]
async fn invalid_coordinates_fail_validation() {
    let app = setup_app().await;
    let (user_id, drone_id, _) = seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/tasks",
        Some(json!({
            "user_id": user_id,
            "drone_id": drone_id,
            "start": {"lat": 123.456, "lon": 0.0},
            "end": {"lat": 1.0, "lon": 1.0}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "validation");
}

#[test]
fn digit_segments_are_ids() {
    use crate::api::users::parse_user_ref;
    use fleet_core::{UserId, UserRef};

    assert_eq!(parse_user_ref("42"), UserRef::ById(UserId(42)));
    assert_eq!(parse_user_ref("alice"), UserRef::ByName("alice".to_string()));
    assert_eq!(parse_user_ref("4b"), UserRef::ByName("4b".to_string()));
}
