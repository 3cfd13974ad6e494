use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, SubsecRound};
use regex::Regex;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
            .expect("email pattern compiles")
    })
}

/// Trimmed value, or an error naming the empty field.
pub fn require_non_empty(field: &str, value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    Ok(trimmed.to_string())
}

pub fn validate_email(value: &str) -> Result<String, String> {
    let email = require_non_empty("email", value)?;
    if email.len() > 254 || !email_pattern().is_match(&email) {
        return Err(format!("'{}' is not a valid email address", email));
    }
    Ok(email)
}

/// Fractional digits kept on instants, matching PostgreSQL `timestamptz`.
pub const INSTANT_SUBSEC_DIGITS: u16 = 6;

/// Parse an RFC 3339 instant. The offset is mandatory so the value names
/// exactly one point in time. Digits past the microsecond are dropped so
/// every store holds the same value.
pub fn parse_instant(field: &str, value: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|instant| instant.trunc_subsecs(INSTANT_SUBSEC_DIGITS))
        .map_err(|_| {
            format!(
                "{} must be an RFC 3339 timestamp with a timezone offset, got '{}'",
                field, value
            )
        })
}

pub fn require_positive_id(field: &str, value: i64) -> Result<i64, String> {
    if value <= 0 {
        return Err(format!("{} must be a positive integer", field));
    }
    Ok(value)
}
