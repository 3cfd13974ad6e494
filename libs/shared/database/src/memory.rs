use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use shared_models::{Appointment, Doctor, NewAppointment, NewDoctor, NewPatient, Patient, RecordId};

use crate::store::{utc_day_bounds, BookingTransaction, ClinicStore, StoreError};

#[derive(Default)]
struct Tables {
    patients: BTreeMap<RecordId, Patient>,
    doctors: BTreeMap<RecordId, Doctor>,
    appointments: BTreeMap<RecordId, Appointment>,
}

impl Tables {
    /// Exclusion rule on (doctor_id, [start_time, end_time)).
    fn collides(&self, candidate: &Appointment) -> bool {
        self.appointments.values().any(|existing| {
            existing.doctor_id == candidate.doctor_id
                && existing.start_time < candidate.end_time()
                && existing.end_time() > candidate.start_time
        })
    }
}

struct Inner {
    tables: RwLock<Tables>,
    doctor_locks: Mutex<HashMap<RecordId, Arc<AsyncMutex<()>>>>,
    lock_doctors: bool,
    closed: AtomicBool,
    next_patient_id: AtomicI64,
    next_doctor_id: AtomicI64,
    next_appointment_id: AtomicI64,
}

impl Inner {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn doctor_lock(&self, doctor_id: RecordId) -> Result<Arc<AsyncMutex<()>>, StoreError> {
        let mut locks = self
            .doctor_locks
            .lock()
            .map_err(|_| StoreError::Backend("doctor lock table poisoned".to_string()))?;
        // Entries left by waiters that were cancelled before acquiring.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(Arc::clone(locks.entry(doctor_id).or_default()))
    }
}

/// Held doctor lock. Once no transaction holds or waits on the lock, its
/// entry leaves the lock table, so ids from requests never accumulate.
struct DoctorLockGuard {
    doctor_id: RecordId,
    inner: Arc<Inner>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DoctorLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Waiters clone the Arc under this same map lock, so a count of one
        // means only the table still refers to it.
        if let Ok(mut locks) = self.inner.doctor_locks.lock() {
            if locks.get(&self.doctor_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&self.doctor_id);
            }
        }
    }
}

/// Process-local store used by default and in tests.
///
/// Booking transactions hold a per-doctor lock from `begin_booking` until
/// they are dropped, and `commit` re-applies the overlap exclusion against
/// committed rows, so a booking that slipped past the lock still cannot
/// produce a double booking.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_doctor_locks(true)
    }

    /// With `false`, concurrent bookings for one doctor are serialized only
    /// by the commit-time exclusion check.
    pub fn with_doctor_locks(lock_doctors: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                doctor_locks: Mutex::new(HashMap::new()),
                lock_doctors,
                closed: AtomicBool::new(false),
                next_patient_id: AtomicI64::new(1),
                next_doctor_id: AtomicI64::new(1),
                next_appointment_id: AtomicI64::new(1),
            }),
        }
    }

    /// All committed appointments, in id order.
    pub async fn appointments(&self) -> Vec<Appointment> {
        self.inner.tables.read().await.appointments.values().cloned().collect()
    }
}

#[async_trait]
impl ClinicStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_patient(&self, patient: NewPatient) -> Result<Patient, StoreError> {
        self.inner.ensure_open()?;
        let mut tables = self.inner.tables.write().await;

        let email_taken = tables
            .patients
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&patient.email));
        if email_taken {
            return Err(StoreError::UniqueViolation("email".to_string()));
        }

        let id = self.inner.next_patient_id.fetch_add(1, Ordering::SeqCst);
        let record = Patient {
            id,
            first_name: patient.first_name,
            last_name: patient.last_name,
            email: patient.email,
            phone_number: patient.phone_number,
            created_at: Utc::now(),
        };
        tables.patients.insert(id, record.clone());
        debug!("Inserted patient {}", id);

        Ok(record)
    }

    async fn get_patient(&self, patient_id: RecordId) -> Result<Option<Patient>, StoreError> {
        self.inner.ensure_open()?;
        Ok(self.inner.tables.read().await.patients.get(&patient_id).cloned())
    }

    async fn insert_doctor(&self, doctor: NewDoctor) -> Result<Doctor, StoreError> {
        self.inner.ensure_open()?;
        let mut tables = self.inner.tables.write().await;

        let id = self.inner.next_doctor_id.fetch_add(1, Ordering::SeqCst);
        let record = Doctor {
            id,
            full_name: doctor.full_name,
            specialization: doctor.specialization,
            is_active: doctor.is_active,
            created_at: Utc::now(),
        };
        tables.doctors.insert(id, record.clone());
        debug!("Inserted doctor {}", id);

        Ok(record)
    }

    async fn get_doctor(&self, doctor_id: RecordId) -> Result<Option<Doctor>, StoreError> {
        self.inner.ensure_open()?;
        Ok(self.inner.tables.read().await.doctors.get(&doctor_id).cloned())
    }

    async fn get_appointment(&self, appointment_id: RecordId) -> Result<Option<Appointment>, StoreError> {
        self.inner.ensure_open()?;
        Ok(self.inner.tables.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn list_appointments(
        &self,
        date: NaiveDate,
        doctor_id: Option<RecordId>,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.inner.ensure_open()?;
        let (day_start, day_end) = utc_day_bounds(date);
        let tables = self.inner.tables.read().await;

        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|apt| apt.start_time >= day_start && apt.start_time < day_end)
            .filter(|apt| doctor_id.map_or(true, |id| apt.doctor_id == id))
            .cloned()
            .collect();
        appointments.sort_by_key(|apt| (apt.start_time, apt.id));

        Ok(appointments)
    }

    async fn appointments_for_doctor_starting_before(
        &self,
        doctor_id: RecordId,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.inner.ensure_open()?;
        let tables = self.inner.tables.read().await;

        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|apt| apt.doctor_id == doctor_id && apt.start_time < end)
            .cloned()
            .collect();
        appointments.sort_by_key(|apt| apt.start_time);

        Ok(appointments)
    }

    async fn begin_booking(&self, doctor_id: RecordId) -> Result<Box<dyn BookingTransaction>, StoreError> {
        self.inner.ensure_open()?;

        let guard = if self.inner.lock_doctors {
            let lock = self.inner.doctor_lock(doctor_id)?;
            Some(DoctorLockGuard {
                doctor_id,
                inner: Arc::clone(&self.inner),
                guard: Some(lock.lock_owned().await),
            })
        } else {
            None
        };

        Ok(Box::new(MemoryBookingTransaction {
            doctor_id,
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            _guard: guard,
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.ensure_open()
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            warn!("Memory store closed twice");
        } else {
            info!("Memory store closed");
        }
        Ok(())
    }
}

struct MemoryBookingTransaction {
    doctor_id: RecordId,
    inner: Arc<Inner>,
    staged: Vec<Appointment>,
    _guard: Option<DoctorLockGuard>,
}

#[async_trait]
impl BookingTransaction for MemoryBookingTransaction {
    fn doctor_id(&self) -> RecordId {
        self.doctor_id
    }

    async fn doctor(&mut self) -> Result<Option<Doctor>, StoreError> {
        self.inner.ensure_open()?;
        Ok(self.inner.tables.read().await.doctors.get(&self.doctor_id).cloned())
    }

    async fn patient_exists(&mut self, patient_id: RecordId) -> Result<bool, StoreError> {
        self.inner.ensure_open()?;
        Ok(self.inner.tables.read().await.patients.contains_key(&patient_id))
    }

    async fn appointments_starting_before(
        &mut self,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.inner.ensure_open()?;
        let tables = self.inner.tables.read().await;

        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .chain(self.staged.iter())
            .filter(|apt| apt.doctor_id == self.doctor_id && apt.start_time < end)
            .cloned()
            .collect();
        appointments.sort_by_key(|apt| apt.start_time);

        Ok(appointments)
    }

    async fn stage_appointment(&mut self, appointment: NewAppointment) -> Result<(), StoreError> {
        if appointment.doctor_id != self.doctor_id {
            return Err(StoreError::Backend(format!(
                "transaction for doctor {} cannot stage appointment for doctor {}",
                self.doctor_id, appointment.doctor_id
            )));
        }

        let id = self.inner.next_appointment_id.fetch_add(1, Ordering::SeqCst);
        self.staged.push(Appointment {
            id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            start_time: appointment.start_time,
            duration_minutes: appointment.duration_minutes,
            created_at: Utc::now(),
        });

        Ok(())
    }

    async fn commit(&mut self) -> Result<Vec<Appointment>, StoreError> {
        self.inner.ensure_open()?;
        let mut tables = self.inner.tables.write().await;

        // Validate the whole batch against a scratch copy so a failure leaves
        // the committed tables untouched.
        let mut pending: Vec<Appointment> = Vec::with_capacity(self.staged.len());
        for appointment in &self.staged {
            if !tables.doctors.contains_key(&appointment.doctor_id) {
                return Err(StoreError::NotFound(format!("doctor {}", appointment.doctor_id)));
            }
            if !tables.patients.contains_key(&appointment.patient_id) {
                return Err(StoreError::NotFound(format!("patient {}", appointment.patient_id)));
            }
            let overlaps_pending = pending.iter().any(|other| {
                other.doctor_id == appointment.doctor_id
                    && other.start_time < appointment.end_time()
                    && other.end_time() > appointment.start_time
            });
            if overlaps_pending || tables.collides(appointment) {
                return Err(StoreError::ExclusionViolation);
            }
            pending.push(appointment.clone());
        }

        for appointment in &pending {
            tables.appointments.insert(appointment.id, appointment.clone());
        }
        self.staged.clear();

        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    fn new_patient(email: &str) -> NewPatient {
        NewPatient {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: email.to_string(),
            phone_number: "000".to_string(),
        }
    }

    fn new_doctor(is_active: bool) -> NewDoctor {
        NewDoctor {
            full_name: "Dr. House".to_string(),
            specialization: "Diagnostics".to_string(),
            is_active,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2031, 5, 20, hour, minute, 0).unwrap()
    }

    async fn seeded() -> (MemoryStore, Patient, Doctor) {
        let store = MemoryStore::new();
        let patient = store.insert_patient(new_patient("john@example.com")).await.unwrap();
        let doctor = store.insert_doctor(new_doctor(true)).await.unwrap();
        (store, patient, doctor)
    }

    #[tokio::test]
    async fn test_patient_email_is_unique_case_insensitive() {
        let store = MemoryStore::new();
        store.insert_patient(new_patient("dup@example.com")).await.unwrap();

        let result = store.insert_patient(new_patient("DUP@example.com")).await;
        assert_matches!(result, Err(StoreError::UniqueViolation(field)) if field == "email");
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_staged_rows() {
        let (store, patient, doctor) = seeded().await;

        {
            let mut tx = store.begin_booking(doctor.id).await.unwrap();
            tx.stage_appointment(NewAppointment {
                patient_id: patient.id,
                doctor_id: doctor.id,
                start_time: at(10, 0),
                duration_minutes: 30,
            })
            .await
            .unwrap();
        }

        assert!(store.appointments().await.is_empty());
    }

    #[tokio::test]
    async fn test_commit_rejects_overlap_with_committed_row() {
        let store = MemoryStore::with_doctor_locks(false);
        let patient = store.insert_patient(new_patient("a@example.com")).await.unwrap();
        let doctor = store.insert_doctor(new_doctor(true)).await.unwrap();
        let slot = NewAppointment {
            patient_id: patient.id,
            doctor_id: doctor.id,
            start_time: at(10, 0),
            duration_minutes: 30,
        };

        let mut first = store.begin_booking(doctor.id).await.unwrap();
        let mut second = store.begin_booking(doctor.id).await.unwrap();
        first.stage_appointment(slot.clone()).await.unwrap();
        second.stage_appointment(slot).await.unwrap();

        assert_eq!(first.commit().await.unwrap().len(), 1);
        assert_matches!(second.commit().await, Err(StoreError::ExclusionViolation));
        assert_eq!(store.appointments().await.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_allows_back_to_back_rows() {
        let (store, patient, doctor) = seeded().await;

        let mut tx = store.begin_booking(doctor.id).await.unwrap();
        for (hour, minute) in [(10, 0), (10, 30)] {
            tx.stage_appointment(NewAppointment {
                patient_id: patient.id,
                doctor_id: doctor.id,
                start_time: at(hour, minute),
                duration_minutes: 30,
            })
            .await
            .unwrap();
        }

        assert_eq!(tx.commit().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_commit_enforces_foreign_keys() {
        let (store, _patient, doctor) = seeded().await;

        let mut tx = store.begin_booking(doctor.id).await.unwrap();
        tx.stage_appointment(NewAppointment {
            patient_id: 999,
            doctor_id: doctor.id,
            start_time: at(9, 0),
            duration_minutes: 15,
        })
        .await
        .unwrap();

        assert_matches!(tx.commit().await, Err(StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_doctor_lock_serializes_transactions() {
        let (store, _patient, doctor) = seeded().await;

        let tx = store.begin_booking(doctor.id).await.unwrap();
        let waiting = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.begin_booking(doctor.id),
        )
        .await;
        assert!(waiting.is_err(), "second transaction must wait for the first");

        drop(tx);
        assert!(store.begin_booking(doctor.id).await.is_ok());
    }

    fn tracked_doctor_locks(store: &MemoryStore) -> usize {
        store.inner.doctor_locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_doctor_lock_entries_are_released() {
        let (store, patient, doctor) = seeded().await;

        for doctor_id in [404, 405, 406] {
            let mut tx = store.begin_booking(doctor_id).await.unwrap();
            assert_eq!(tracked_doctor_locks(&store), 1);
            assert_matches!(tx.doctor().await, Ok(None));
        }
        assert_eq!(tracked_doctor_locks(&store), 0);

        let mut tx = store.begin_booking(doctor.id).await.unwrap();
        tx.stage_appointment(NewAppointment {
            patient_id: patient.id,
            doctor_id: doctor.id,
            start_time: at(10, 0),
            duration_minutes: 30,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        assert_eq!(tracked_doctor_locks(&store), 0);
    }

    #[tokio::test]
    async fn test_doctor_lock_entry_survives_while_contended() {
        let (store, _patient, doctor) = seeded().await;

        let first = store.begin_booking(doctor.id).await.unwrap();
        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.begin_booking(doctor.id).await.map(|_| ()) })
        };
        tokio::task::yield_now().await;

        drop(first);
        contender.await.unwrap().unwrap();
        assert_eq!(tracked_doctor_locks(&store), 0);

        // Cancelled waiters are swept on the next acquisition.
        let held = store.begin_booking(doctor.id).await.unwrap();
        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            store.begin_booking(doctor.id),
        )
        .await;
        assert!(cancelled.is_err());
        drop(held);
        drop(store.begin_booking(999).await.unwrap());
        assert_eq!(tracked_doctor_locks(&store), 0);
    }

    #[tokio::test]
    async fn test_doctor_reads_take_no_lock() {
        let (store, patient, doctor) = seeded().await;
        let mut tx = store.begin_booking(doctor.id).await.unwrap();
        tx.stage_appointment(NewAppointment {
            patient_id: patient.id,
            doctor_id: doctor.id,
            start_time: at(10, 0),
            duration_minutes: 30,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let read = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            store.appointments_for_doctor_starting_before(doctor.id, at(10, 30)),
        )
        .await
        .expect("read must not wait for the booking lock")
        .unwrap();
        assert_eq!(read.len(), 1);

        assert!(store
            .appointments_for_doctor_starting_before(doctor.id, at(10, 0))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_appointments_filters_by_utc_day_and_doctor() {
        let (store, patient, doctor) = seeded().await;
        let other = store.insert_doctor(new_doctor(true)).await.unwrap();

        for (doctor_id, start) in [
            (doctor.id, at(23, 30)),
            (doctor.id, at(8, 0)),
            (other.id, at(12, 0)),
            (doctor.id, at(8, 0) + Duration::days(1)),
        ] {
            let mut tx = store.begin_booking(doctor_id).await.unwrap();
            tx.stage_appointment(NewAppointment {
                patient_id: patient.id,
                doctor_id,
                start_time: start,
                duration_minutes: 30,
            })
            .await
            .unwrap();
            tx.commit().await.unwrap();
        }

        let day = at(0, 0).date_naive();
        let all = store.list_appointments(day, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].start_time <= w[1].start_time));

        let only_doctor = store.list_appointments(day, Some(doctor.id)).await.unwrap();
        assert_eq!(only_doctor.len(), 2);
        assert_eq!(only_doctor[0].start_time, at(8, 0));
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.close().await.unwrap();

        assert_matches!(store.health_check().await, Err(StoreError::Closed));
        assert_matches!(store.get_doctor(1).await, Err(StoreError::Closed));
    }
}
