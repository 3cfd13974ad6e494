pub mod booking;
pub mod conflict;
pub mod interval;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use interval::TimeInterval;
