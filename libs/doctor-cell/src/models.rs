use serde::{Deserialize, Serialize};

use shared_models::NewDoctor;
use shared_utils::validation::require_non_empty;

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub full_name: String,
    pub specialization: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl CreateDoctorRequest {
    pub fn into_new_doctor(self) -> Result<NewDoctor, DoctorError> {
        Ok(NewDoctor {
            full_name: require_non_empty("full_name", &self.full_name)
                .map_err(DoctorError::ValidationError)?,
            specialization: require_non_empty("specialization", &self.specialization)
                .map_err(DoctorError::ValidationError)?,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
