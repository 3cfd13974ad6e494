use chrono::{DateTime, Duration, TimeZone, Utc};

use shared_models::{Appointment, NewAppointment};

pub const MIN_DURATION_MINUTES: i32 = 15;
pub const MAX_DURATION_MINUTES: i32 = 180;

/// Half-open span `[start, end)` in UTC occupied by an appointment.
///
/// Every comparison in the booking path goes through this type, so instants
/// that arrived with different offsets are compared in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new<Tz: TimeZone>(start: &DateTime<Tz>, duration_minutes: i32) -> Self {
        let start = start.with_timezone(&Utc);
        Self {
            start,
            end: start + Duration::minutes(duration_minutes as i64),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl From<&Appointment> for TimeInterval {
    fn from(appointment: &Appointment) -> Self {
        Self::new(&appointment.start_time, appointment.duration_minutes)
    }
}

impl From<&NewAppointment> for TimeInterval {
    fn from(appointment: &NewAppointment) -> Self {
        Self::new(&appointment.start_time, appointment.duration_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_end_is_start_plus_duration() {
        let start = Utc.with_ymd_and_hms(2030, 6, 1, 10, 0, 0).unwrap();
        let interval = TimeInterval::new(&start, 45);

        assert_eq!(interval.start(), start);
        assert_eq!(interval.end(), Utc.with_ymd_and_hms(2030, 6, 1, 10, 45, 0).unwrap());
        assert_eq!(interval.duration(), Duration::minutes(45));
    }

    #[test]
    fn test_equivalent_instants_in_different_offsets_are_equal() {
        let utc = Utc.with_ymd_and_hms(2030, 6, 1, 10, 0, 0).unwrap();
        let ist = FixedOffset::east_opt(5 * 3600 + 1800)
            .unwrap()
            .with_ymd_and_hms(2030, 6, 1, 15, 30, 0)
            .unwrap();
        let pacific = FixedOffset::west_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2030, 6, 1, 3, 0, 0)
            .unwrap();

        assert_eq!(TimeInterval::new(&utc, 30), TimeInterval::new(&ist, 30));
        assert_eq!(TimeInterval::new(&utc, 30), TimeInterval::new(&pacific, 30));
    }

    #[test]
    fn test_interval_crosses_midnight() {
        let start = Utc.with_ymd_and_hms(2030, 6, 1, 23, 30, 0).unwrap();
        let interval = TimeInterval::new(&start, 60);
        assert_eq!(interval.end(), Utc.with_ymd_and_hms(2030, 6, 2, 0, 30, 0).unwrap());
    }
}
