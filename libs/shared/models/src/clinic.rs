use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identifier shared by every table.
pub type RecordId = i64;

// ==============================================================================
// STORED RECORDS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: RecordId,
    pub full_name: String,
    pub specialization: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Doctor {
    /// A doctor can take new bookings only while active.
    pub fn is_bookable(&self) -> bool {
        self.is_active
    }
}

/// Appointment row. `start_time` is always stored in UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: RecordId,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes as i64)
    }
}

// ==============================================================================
// INSERT RECORDS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDoctor {
    pub full_name: String,
    pub specialization: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: RecordId,
    pub doctor_id: RecordId,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
}

impl NewAppointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_appointment_end_time_is_derived() {
        let start = Utc.with_ymd_and_hms(2030, 3, 4, 10, 0, 0).unwrap();
        let appointment = Appointment {
            id: 1,
            patient_id: 2,
            doctor_id: 3,
            start_time: start,
            duration_minutes: 45,
            created_at: start,
        };

        assert_eq!(appointment.end_time(), Utc.with_ymd_and_hms(2030, 3, 4, 10, 45, 0).unwrap());
    }

    #[test]
    fn test_inactive_doctor_is_not_bookable() {
        let doctor = Doctor {
            id: 1,
            full_name: "Dr. House".to_string(),
            specialization: "Diagnostics".to_string(),
            is_active: false,
            created_at: Utc::now(),
        };

        assert!(!doctor.is_bookable());
    }
}
