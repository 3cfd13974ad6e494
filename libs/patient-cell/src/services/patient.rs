use std::sync::Arc;

use tracing::{debug, error, info};

use shared_database::{ClinicStore, StoreError};
use shared_models::{Patient, RecordId};

use crate::models::{CreatePatientRequest, PatientError};

pub struct PatientService {
    store: Arc<dyn ClinicStore>,
}

impl PatientService {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    pub async fn create_patient(&self, request: CreatePatientRequest) -> Result<Patient, PatientError> {
        let new_patient = request.into_new_patient()?;
        debug!("Creating new patient profile for: {}", new_patient.email);

        let email = new_patient.email.clone();
        let patient = self.store.insert_patient(new_patient).await.map_err(|e| match e {
            StoreError::UniqueViolation(_) => PatientError::EmailAlreadyExists { email },
            other => {
                error!("Failed to insert patient: {}", other);
                PatientError::DatabaseError(other.to_string())
            }
        })?;

        info!("Patient profile created with ID: {}", patient.id);
        Ok(patient)
    }

    pub async fn get_patient(&self, patient_id: RecordId) -> Result<Patient, PatientError> {
        debug!("Fetching patient profile: {}", patient_id);

        self.store
            .get_patient(patient_id)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?
            .ok_or(PatientError::NotFound)
    }
}
