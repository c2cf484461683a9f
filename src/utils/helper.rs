use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since epoch
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `min(base * 2^attempt, cap)`, saturating instead of overflowing.
pub fn exponential_backoff(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .map(|d| d.min(cap))
        .unwrap_or(cap)
}
