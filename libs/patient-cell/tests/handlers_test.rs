use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use patient_cell::router::patient_routes;
use shared_utils::test_utils::{get_request, json_request, read_json, TestClinic};

fn patient_payload(email: &str) -> serde_json::Value {
    json!({
        "first_name": "Spoorthi",
        "last_name": "--",
        "email": email,
        "phone_number": "9876543210"
    })
}

#[tokio::test]
async fn test_create_patient_success() {
    let clinic = TestClinic::default();
    let app = patient_routes(clinic.state.clone());

    let response = app
        .oneshot(json_request("POST", "/", &patient_payload("new@example.com")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["email"], "new@example.com");
    assert!(body["id"].as_i64().unwrap() > 0);
    assert!(body["created_at"].is_string());
}

#[tokio::test]
async fn test_create_patient_duplicate_email() {
    let clinic = TestClinic::default();
    let payload = patient_payload("duplicate@example.com");

    let first = patient_routes(clinic.state.clone())
        .oneshot(json_request("POST", "/", &payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = patient_routes(clinic.state.clone())
        .oneshot(json_request("POST", "/", &payload))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = read_json(second).await;
    assert!(body["error"].as_str().unwrap().contains("already registered"));
}

#[tokio::test]
async fn test_create_patient_invalid_email() {
    let clinic = TestClinic::default();

    let response = patient_routes(clinic.state.clone())
        .oneshot(json_request("POST", "/", &patient_payload("not-an-email")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_patient_missing_field() {
    let clinic = TestClinic::default();

    let response = patient_routes(clinic.state.clone())
        .oneshot(json_request("POST", "/", &json!({ "first_name": "A" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_get_patient_round_trip() {
    let clinic = TestClinic::default();
    let patient = clinic.patient("lookup@example.com").await;

    let response = patient_routes(clinic.state.clone())
        .oneshot(get_request(&format!("/{}", patient.id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["id"], patient.id);
    assert_eq!(body["email"], "lookup@example.com");
}

#[tokio::test]
async fn test_get_patient_not_found() {
    let clinic = TestClinic::default();

    let response = patient_routes(clinic.state.clone())
        .oneshot(get_request("/9999"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
