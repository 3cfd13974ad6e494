use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    routing::get,
    Json,
};
use serde_json::{json, Value};

use appointment_cell::router::appointment_routes;
use doctor_cell::router::doctor_routes;
use patient_cell::router::patient_routes;
use shared_database::AppState;
use shared_models::error::AppError;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .route("/health", get(health_check))
        .with_state(state.clone())
        .nest("/patients", patient_routes(state.clone()))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/appointments", appointment_routes(state))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    state.store
        .health_check()
        .await
        .map_err(|e| AppError::Internal(format!("store unavailable: {}", e)))?;

    Ok(Json(json!({
        "status": "ok",
        "store": state.store.backend_name(),
    })))
}
