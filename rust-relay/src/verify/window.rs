//! Replay window for signed timestamps.

use super::types::DenyReason;

/// Symmetric tolerance around the current time.
///
/// Timestamps too far in the past (replays) and too far in the future (skewed
/// or forged clocks) are both rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampWindow {
    tolerance_secs: u64,
}

impl TimestampWindow {
    pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

    pub fn new(tolerance_secs: u64) -> Self {
        Self { tolerance_secs }
    }

    pub fn tolerance_secs(&self) -> u64 {
        self.tolerance_secs
    }

    /// Check an already parsed timestamp against `now`.
    pub fn check(&self, timestamp: i64, now: i64) -> Result<(), DenyReason> {
        if timestamp.abs_diff(now) > self.tolerance_secs {
            return Err(DenyReason::TimestampOutOfWindow);
        }
        Ok(())
    }
}

impl Default for TimestampWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOLERANCE_SECS)
    }
}

/// Parse a decimal seconds-since-epoch header value.
pub fn parse_timestamp(raw: &str) -> Result<i64, DenyReason> {
    raw.parse::<i64>().map_err(|_| DenyReason::MalformedTimestamp)
}
