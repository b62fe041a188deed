//! Six-digit one-time codes.

use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub const OTP_LENGTH: usize = 6;

pub fn generate_otp() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    let n = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    format!("{:06}", n % 1_000_000)
}

pub fn otp_expiry(now: OffsetDateTime, lifetime_minutes: u64) -> OffsetDateTime {
    now + Duration::minutes(i64::try_from(lifetime_minutes).unwrap_or(i64::MAX / 60))
}

/// Constant-time comparison of a submitted code against the stored one.
pub fn otp_matches(expected: &str, submitted: &str) -> bool {
    let submitted = submitted.trim();
    expected.len() == submitted.len() && bool::from(expected.as_bytes().ct_eq(submitted.as_bytes()))
}
