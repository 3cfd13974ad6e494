use std::sync::Arc;

use tracing::{debug, info};

use shared_database::ClinicStore;
use shared_models::{Doctor, RecordId};

use crate::models::{CreateDoctorRequest, DoctorError};

pub struct DoctorService {
    store: Arc<dyn ClinicStore>,
}

impl DoctorService {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    pub async fn create_doctor(&self, request: CreateDoctorRequest) -> Result<Doctor, DoctorError> {
        let new_doctor = request.into_new_doctor()?;
        debug!("Creating doctor profile for: {}", new_doctor.full_name);

        let doctor = self.store
            .insert_doctor(new_doctor)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        info!("Doctor profile created with ID: {} (active: {})", doctor.id, doctor.is_active);
        Ok(doctor)
    }

    pub async fn get_doctor(&self, doctor_id: RecordId) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor profile: {}", doctor_id);

        self.store
            .get_doctor(doctor_id)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?
            .ok_or(DoctorError::NotFound)
    }
}
