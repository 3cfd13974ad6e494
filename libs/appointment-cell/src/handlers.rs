// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use shared_database::AppState;
use shared_models::error::AppError;
use shared_models::RecordId;
use shared_utils::extractor::{ValidJson, ValidQuery};

use crate::models::{
    AppointmentError, AppointmentListQuery, BookAppointmentRequest, ConflictCheckQuery,
};
use crate::services::booking::AppointmentBookingService;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::DoctorNotEligible => {
                AppError::NotFound("doctor not found or inactive".to_string())
            },
            AppointmentError::PatientNotFound => AppError::NotFound("patient not found".to_string()),
            AppointmentError::SchedulingConflict | AppointmentError::ConstraintViolation => {
                AppError::Conflict("doctor has a scheduling conflict".to_string())
            },
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking_service = AppointmentBookingService::new(state.store.clone());

    let appointment = booking_service.book_appointment(request, Utc::now()).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(state.store.clone());

    let appointments = booking_service.list_appointments(query).await?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<RecordId>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(state.store.clone());

    let appointment = booking_service.get_appointment(appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(state.store.clone());

    let report = booking_service.check_conflicts(query).await?;

    Ok(Json(json!(report)))
}
