// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use shared_database::{ClinicStore, StoreError};
use shared_models::{Appointment, NewAppointment, RecordId};
use shared_utils::validation::{parse_instant, require_positive_id};

use crate::models::{
    AppointmentError, AppointmentListQuery, AppointmentResponse, BookAppointmentRequest,
    ConflictCheckQuery, ConflictCheckResponse, validate_duration,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::interval::TimeInterval;

fn store_failure(err: StoreError) -> AppointmentError {
    error!("Store failure during appointment operation: {}", err);
    AppointmentError::DatabaseError(err.to_string())
}

/// The only write path for appointments.
pub struct AppointmentBookingService {
    store: Arc<dyn ClinicStore>,
    conflict_service: ConflictDetectionService,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self {
            store,
            conflict_service: ConflictDetectionService::new(),
        }
    }

    /// Validate a raw request against `now` and book it.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<AppointmentResponse, AppointmentError> {
        let booking = request.validate(now)?;
        let appointment = self.book(booking).await?;
        Ok(AppointmentResponse::from(appointment))
    }

    /// Eligibility check, overlap check and insert inside one booking
    /// transaction for the doctor. Any early return drops the transaction,
    /// which discards whatever it staged.
    #[instrument(skip(self, booking), fields(doctor_id = booking.doctor_id, patient_id = booking.patient_id))]
    pub async fn book(&self, booking: NewAppointment) -> Result<Appointment, AppointmentError> {
        let interval = TimeInterval::from(&booking);
        debug!("Booking {} - {}", interval.start(), interval.end());

        let mut tx = self.store
            .begin_booking(booking.doctor_id)
            .await
            .map_err(store_failure)?;

        let eligible = tx.doctor()
            .await
            .map_err(store_failure)?
            .is_some_and(|doctor| doctor.is_bookable());
        if !eligible {
            warn!("Doctor {} not found or inactive", booking.doctor_id);
            return Err(AppointmentError::DoctorNotEligible);
        }

        if !tx.patient_exists(booking.patient_id).await.map_err(store_failure)? {
            warn!("Patient {} not found", booking.patient_id);
            return Err(AppointmentError::PatientNotFound);
        }

        if self.conflict_service
            .has_conflict(tx.as_mut(), &interval)
            .await
            .map_err(store_failure)?
        {
            return Err(AppointmentError::SchedulingConflict);
        }

        tx.stage_appointment(booking).await.map_err(store_failure)?;

        let committed = tx.commit().await.map_err(|e| match e {
            StoreError::ExclusionViolation => {
                warn!("Store constraint rejected booking after overlap check passed");
                AppointmentError::ConstraintViolation
            }
            StoreError::NotFound(what) if what.contains("doctor") => AppointmentError::DoctorNotEligible,
            StoreError::NotFound(_) => AppointmentError::PatientNotFound,
            other => store_failure(other),
        })?;

        let appointment = committed
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("commit returned no appointment".to_string()))?;

        info!("Appointment {} booked for doctor {} at {}",
              appointment.id, appointment.doctor_id, appointment.start_time);

        Ok(appointment)
    }

    pub async fn get_appointment(&self, appointment_id: RecordId) -> Result<AppointmentResponse, AppointmentError> {
        debug!("Fetching appointment {}", appointment_id);

        self.store
            .get_appointment(appointment_id)
            .await
            .map_err(store_failure)?
            .map(AppointmentResponse::from)
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn list_appointments(
        &self,
        query: AppointmentListQuery,
    ) -> Result<Vec<AppointmentResponse>, AppointmentError> {
        debug!("Listing appointments on {} (doctor: {:?})", query.date, query.doctor_id);

        let appointments = self.store
            .list_appointments(query.date, query.doctor_id)
            .await
            .map_err(store_failure)?;

        Ok(appointments.into_iter().map(AppointmentResponse::from).collect())
    }

    /// Advisory read: which of the doctor's appointments would collide with
    /// the proposed slot right now. Takes no booking lock and stages nothing.
    pub async fn check_conflicts(
        &self,
        query: ConflictCheckQuery,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let doctor_id = require_positive_id("doctor_id", query.doctor_id)
            .map_err(AppointmentError::ValidationError)?;
        let duration_minutes = validate_duration(query.duration_minutes)?;
        let start = parse_instant("start_time", &query.start_time)
            .map_err(AppointmentError::ValidationError)?;
        let interval = TimeInterval::new(&start, duration_minutes);

        let conflicting = self.conflict_service
            .find_committed_conflicts(self.store.as_ref(), doctor_id, &interval)
            .await
            .map_err(store_failure)?;

        Ok(ConflictCheckResponse {
            has_conflict: !conflicting.is_empty(),
            conflicting_appointments: conflicting.into_iter().map(AppointmentResponse::from).collect(),
        })
    }
}
