use serde::{Deserialize, Serialize};

use shared_models::NewPatient;
use shared_utils::validation::{require_non_empty, validate_email};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
}

impl CreatePatientRequest {
    /// Validate and build the insert record field by field.
    pub fn into_new_patient(self) -> Result<NewPatient, PatientError> {
        Ok(NewPatient {
            first_name: require_non_empty("first_name", &self.first_name)
                .map_err(PatientError::ValidationError)?,
            last_name: require_non_empty("last_name", &self.last_name)
                .map_err(PatientError::ValidationError)?,
            email: validate_email(&self.email).map_err(PatientError::ValidationError)?,
            phone_number: self.phone_number.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Email already registered")]
    EmailAlreadyExists { email: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
