use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use doctor_cell::router::doctor_routes;
use shared_utils::test_utils::{get_request, json_request, read_json, TestClinic};

#[tokio::test]
async fn test_create_doctor_success() {
    let clinic = TestClinic::default();

    let response = doctor_routes(clinic.state.clone())
        .oneshot(json_request("POST", "/", &json!({
            "full_name": "Dr. House",
            "specialization": "Diagnostics"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["full_name"], "Dr. House");
    assert_eq!(body["is_active"], true);
}

#[tokio::test]
async fn test_create_inactive_doctor() {
    let clinic = TestClinic::default();

    let response = doctor_routes(clinic.state.clone())
        .oneshot(json_request("POST", "/", &json!({
            "full_name": "Dr. Retired",
            "specialization": "Surgery",
            "is_active": false
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["is_active"], false);
}

#[tokio::test]
async fn test_create_doctor_requires_specialization() {
    let clinic = TestClinic::default();

    let response = doctor_routes(clinic.state.clone())
        .oneshot(json_request("POST", "/", &json!({
            "full_name": "Dr. House",
            "specialization": ""
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("specialization"));
}

#[tokio::test]
async fn test_get_doctor() {
    let clinic = TestClinic::default();
    let doctor = clinic.doctor("Dr. Wilson").await;

    let response = doctor_routes(clinic.state.clone())
        .oneshot(get_request(&format!("/{}", doctor.id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["full_name"], "Dr. Wilson");
}

#[tokio::test]
async fn test_get_doctor_not_found() {
    let clinic = TestClinic::default();

    let response = doctor_routes(clinic.state.clone())
        .oneshot(get_request("/4242"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["error"], "Doctor not found");
}
