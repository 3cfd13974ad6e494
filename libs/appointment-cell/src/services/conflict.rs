use tracing::{debug, warn};

use shared_database::{BookingTransaction, ClinicStore, StoreError};
use shared_models::{Appointment, RecordId};

use crate::services::interval::TimeInterval;

/// Half-open overlap: each interval starts before the other ends.
/// Back-to-back intervals do not overlap.
pub fn intervals_overlap(existing: &TimeInterval, candidate: &TimeInterval) -> bool {
    existing.start() < candidate.end() && existing.end() > candidate.start()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictDetectionService;

impl ConflictDetectionService {
    pub fn new() -> Self {
        Self
    }

    /// Existing appointments of the transaction's doctor that intersect
    /// `candidate`, read inside that transaction.
    pub async fn find_conflicts(
        &self,
        tx: &mut dyn BookingTransaction,
        candidate: &TimeInterval,
    ) -> Result<Vec<Appointment>, StoreError> {
        debug!("Checking conflicts for doctor {} from {} to {}",
               tx.doctor_id(), candidate.start(), candidate.end());

        // Anything starting at or after the candidate's end cannot overlap;
        // the store may use that to narrow the read.
        let existing = tx.appointments_starting_before(candidate.end()).await?;

        Ok(self.overlapping(tx.doctor_id(), existing, candidate))
    }

    /// Committed appointments of `doctor_id` that intersect `candidate`,
    /// read without taking the doctor's booking lock.
    pub async fn find_committed_conflicts(
        &self,
        store: &dyn ClinicStore,
        doctor_id: RecordId,
        candidate: &TimeInterval,
    ) -> Result<Vec<Appointment>, StoreError> {
        debug!("Advisory conflict read for doctor {} from {} to {}",
               doctor_id, candidate.start(), candidate.end());

        let existing = store
            .appointments_for_doctor_starting_before(doctor_id, candidate.end())
            .await?;

        Ok(self.overlapping(doctor_id, existing, candidate))
    }

    fn overlapping(
        &self,
        doctor_id: RecordId,
        existing: Vec<Appointment>,
        candidate: &TimeInterval,
    ) -> Vec<Appointment> {
        let conflicting: Vec<Appointment> = existing
            .into_iter()
            .filter(|appointment| intervals_overlap(&TimeInterval::from(appointment), candidate))
            .collect();

        if !conflicting.is_empty() {
            warn!("Conflict detected for doctor {} - {} conflicting appointments",
                  doctor_id, conflicting.len());
        }

        conflicting
    }

    pub async fn has_conflict(
        &self,
        tx: &mut dyn BookingTransaction,
        candidate: &TimeInterval,
    ) -> Result<bool, StoreError> {
        Ok(!self.find_conflicts(tx, candidate).await?.is_empty())
    }
}
