//! Repository contract shared by every storage backend.
//!
//! Cells only ever see `Arc<dyn ClinicStore>`. The appointments table has a
//! single writer, the booking path, which goes through a
//! [`BookingTransaction`] scoped to one doctor.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use shared_models::{Appointment, Doctor, NewAppointment, NewDoctor, NewPatient, Patient, RecordId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    UniqueViolation(String),

    /// Two appointments for the same doctor would intersect.
    #[error("appointment overlaps an existing booking for the same doctor")]
    ExclusionViolation,

    #[error("referenced record not found: {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store is closed")]
    Closed,
}

/// Check-and-write unit for one doctor's appointments.
///
/// Reads observe committed rows plus anything staged in this transaction.
/// Nothing is visible to other callers until [`commit`](Self::commit)
/// succeeds; dropping the transaction discards every staged row.
#[async_trait]
pub trait BookingTransaction: Send {
    fn doctor_id(&self) -> RecordId;

    async fn doctor(&mut self) -> Result<Option<Doctor>, StoreError>;

    async fn patient_exists(&mut self, patient_id: RecordId) -> Result<bool, StoreError>;

    /// Appointments of this doctor whose start is strictly before `end`.
    async fn appointments_starting_before(
        &mut self,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn stage_appointment(&mut self, appointment: NewAppointment) -> Result<(), StoreError>;

    /// Persist all staged rows atomically and return them as stored.
    async fn commit(&mut self) -> Result<Vec<Appointment>, StoreError>;
}

#[async_trait]
pub trait ClinicStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn insert_patient(&self, patient: NewPatient) -> Result<Patient, StoreError>;

    async fn get_patient(&self, patient_id: RecordId) -> Result<Option<Patient>, StoreError>;

    async fn insert_doctor(&self, doctor: NewDoctor) -> Result<Doctor, StoreError>;

    async fn get_doctor(&self, doctor_id: RecordId) -> Result<Option<Doctor>, StoreError>;

    async fn get_appointment(&self, appointment_id: RecordId) -> Result<Option<Appointment>, StoreError>;

    /// Appointments starting on `date` (UTC calendar day), ordered by start time.
    async fn list_appointments(
        &self,
        date: NaiveDate,
        doctor_id: Option<RecordId>,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Committed appointments of `doctor_id` starting strictly before `end`.
    /// Takes no booking lock.
    async fn appointments_for_doctor_starting_before(
        &self,
        doctor_id: RecordId,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn begin_booking(&self, doctor_id: RecordId) -> Result<Box<dyn BookingTransaction>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

/// Half-open range of the UTC day `date`.
pub(crate) fn utc_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::days(1))
}
