// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shared_models::{Appointment, NewAppointment, RecordId};
use shared_utils::validation::{parse_instant, require_positive_id};

use crate::services::interval::{MAX_DURATION_MINUTES, MIN_DURATION_MINUTES};

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Raw booking request. `start_time` stays a string until validation so a
/// timestamp without an offset can be rejected explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: RecordId,
    pub doctor_id: RecordId,
    pub start_time: String,
    pub duration_minutes: i32,
}

impl BookAppointmentRequest {
    /// Validate every field and build the insert record. `now` is the moment
    /// the request arrived; the start must be strictly after it.
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewAppointment, AppointmentError> {
        let patient_id = require_positive_id("patient_id", self.patient_id)
            .map_err(AppointmentError::ValidationError)?;
        let doctor_id = require_positive_id("doctor_id", self.doctor_id)
            .map_err(AppointmentError::ValidationError)?;
        let duration_minutes = validate_duration(self.duration_minutes)?;
        let start_time = parse_instant("start_time", &self.start_time)
            .map_err(AppointmentError::ValidationError)?
            .with_timezone(&Utc);

        if start_time <= now {
            return Err(AppointmentError::ValidationError(
                "Appointment must be in the future".to_string(),
            ));
        }

        Ok(NewAppointment {
            patient_id,
            doctor_id,
            start_time,
            duration_minutes,
        })
    }
}

pub fn validate_duration(duration_minutes: i32) -> Result<i32, AppointmentError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
        return Err(AppointmentError::ValidationError(format!(
            "duration_minutes must be between {} and {}",
            MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
        )));
    }
    Ok(duration_minutes)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentResponse {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: RecordId,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub end_time: DateTime<Utc>,
}

impl From<Appointment> for AppointmentResponse {
    fn from(appointment: Appointment) -> Self {
        Self {
            end_time: appointment.end_time(),
            id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            start_time: appointment.start_time,
            duration_minutes: appointment.duration_minutes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentListQuery {
    pub date: NaiveDate,
    pub doctor_id: Option<RecordId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictCheckQuery {
    pub doctor_id: RecordId,
    pub start_time: String,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<AppointmentResponse>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("doctor not found or inactive")]
    DoctorNotEligible,

    #[error("patient not found")]
    PatientNotFound,

    #[error("doctor has a scheduling conflict")]
    SchedulingConflict,

    /// The store rejected the write after the overlap check passed,
    /// because a concurrent booking committed first.
    #[error("doctor has a scheduling conflict (rejected by store constraint)")]
    ConstraintViolation,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    /// Both conflict kinds look the same to callers.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppointmentError::SchedulingConflict | AppointmentError::ConstraintViolation)
    }
}
