//! Timeout records and the arithmetic behind them
//!
//! Everything here is pure: callers pass the current monotonic instant in, so
//! the same record can be driven by a real clock or a paused test clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Parameters for a single `start` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSpec {
    /// Full duration measured from activation. Non-positive values fire immediately.
    pub total_duration_ms: i64,
    /// Offset from activation at which the warning fires
    #[serde(default)]
    pub warning_offset_ms: Option<i64>,
}

impl TimeoutSpec {
    pub fn new(total_duration_ms: i64) -> Self {
        Self {
            total_duration_ms,
            warning_offset_ms: None,
        }
    }

    pub fn with_warning(mut self, warning_offset_ms: i64) -> Self {
        self.warning_offset_ms = Some(warning_offset_ms);
        self
    }
}

/// State of one tracked subtask deadline
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutRecord {
    pub id: String,
    /// Never changes for the lifetime of the record, including across extensions
    pub activation_time: Instant,
    pub activated_at: DateTime<Utc>,
    pub total_duration_ms: i64,
    pub warning_offset_ms: Option<i64>,
    pub has_warned: bool,
    pub is_active: bool,
    /// Bumped every time the record's timers are (re)scheduled
    pub generation: u64,
}

/// Outcome of applying an extension or reduction to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension {
    pub elapsed_ms: i64,
    pub requested_total_ms: i64,
    pub new_total_ms: i64,
    /// True when the minimum remaining floor overrode the requested delta
    pub clamped: bool,
}

/// Serializable snapshot of a record, as returned by status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutStatus {
    pub id: String,
    pub activated_at: DateTime<Utc>,
    pub elapsed_ms: i64,
    pub total_duration_ms: i64,
    pub warning_offset_ms: Option<i64>,
    pub remaining_ms: i64,
    pub has_warned: bool,
    pub is_active: bool,
}

impl TimeoutRecord {
    pub fn new(id: String, spec: TimeoutSpec, now: Instant, generation: u64) -> Self {
        Self {
            id,
            activation_time: now,
            activated_at: Utc::now(),
            total_duration_ms: spec.total_duration_ms,
            warning_offset_ms: spec.warning_offset_ms,
            has_warned: false,
            is_active: true,
            generation,
        }
    }

    pub fn elapsed_ms(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.activation_time).as_millis();
        i64::try_from(elapsed).unwrap_or(i64::MAX)
    }

    /// Remaining time clamped to zero; inactive records have none left
    pub fn remaining_ms(&self, now: Instant) -> i64 {
        if !self.is_active {
            return 0;
        }
        self.timeout_delay_ms(now).max(0)
    }

    /// Unclamped delay from `now` until the deadline
    pub fn timeout_delay_ms(&self, now: Instant) -> i64 {
        self.total_duration_ms.saturating_sub(self.elapsed_ms(now))
    }

    /// Delay from `now` until the warning point, if a warning is still pending
    pub fn warning_delay_ms(&self, now: Instant) -> Option<i64> {
        if self.has_warned {
            return None;
        }
        self.warning_offset_ms
            .map(|offset| offset.saturating_sub(self.elapsed_ms(now)))
    }

    /// Applies a signed delta to the total duration.
    ///
    /// The result always leaves at least `min_remaining_ms` on the clock; a
    /// delta that would undercut the floor is clamped rather than rejected.
    /// `has_warned` latches to true once the original warning offset has been
    /// passed, so a later extension never re-arms an earlier warning. A warning
    /// due exactly now stays pending and is rescheduled with zero delay.
    pub fn apply_extension(
        &mut self,
        delta_ms: i64,
        min_remaining_ms: i64,
        now: Instant,
    ) -> Extension {
        let elapsed_ms = self.elapsed_ms(now);
        let requested_total_ms = self.total_duration_ms.saturating_add(delta_ms);
        let floor_total_ms = elapsed_ms.saturating_add(min_remaining_ms);

        let clamped = requested_total_ms < floor_total_ms;
        let new_total_ms = if clamped {
            floor_total_ms
        } else {
            requested_total_ms
        };
        self.total_duration_ms = new_total_ms;

        if let Some(offset) = self.warning_offset_ms {
            if elapsed_ms > offset {
                self.has_warned = true;
            }
        }

        Extension {
            elapsed_ms,
            requested_total_ms,
            new_total_ms,
            clamped,
        }
    }

    pub fn status(&self, now: Instant) -> TimeoutStatus {
        TimeoutStatus {
            id: self.id.clone(),
            activated_at: self.activated_at,
            elapsed_ms: self.elapsed_ms(now),
            total_duration_ms: self.total_duration_ms,
            warning_offset_ms: self.warning_offset_ms,
            remaining_ms: self.remaining_ms(now),
            has_warned: self.has_warned,
            is_active: self.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FLOOR: i64 = 60_000;

    fn after(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn test_new_record() {
        let now = Instant::now();
        let record = TimeoutRecord::new("t1".to_string(), TimeoutSpec::new(5000), now, 1);

        assert_eq!(record.id, "t1");
        assert!(record.is_active);
        assert!(!record.has_warned);
        assert_eq!(record.generation, 1);
        assert_eq!(record.remaining_ms(now), 5000);
        assert_eq!(record.warning_delay_ms(now), None);
    }

    #[test]
    fn test_remaining_is_clamped_at_zero() {
        let start = Instant::now();
        let record = TimeoutRecord::new("t1".to_string(), TimeoutSpec::new(5000), start, 1);

        assert_eq!(record.remaining_ms(after(start, 2000)), 3000);
        assert_eq!(record.remaining_ms(after(start, 9000)), 0);
        assert_eq!(record.timeout_delay_ms(after(start, 9000)), -4000);
    }

    #[test]
    fn test_inactive_record_has_no_remaining_time() {
        let start = Instant::now();
        let mut record = TimeoutRecord::new("t1".to_string(), TimeoutSpec::new(5000), start, 1);
        record.is_active = false;

        assert_eq!(record.remaining_ms(start), 0);
    }

    #[test]
    fn test_warning_delay_tracks_elapsed() {
        let start = Instant::now();
        let spec = TimeoutSpec::new(5000).with_warning(2000);
        let mut record = TimeoutRecord::new("t1".to_string(), spec, start, 1);

        assert_eq!(record.warning_delay_ms(after(start, 500)), Some(1500));

        record.has_warned = true;
        assert_eq!(record.warning_delay_ms(after(start, 500)), None);
    }

    #[test]
    fn test_extension_adds_delta() {
        let start = Instant::now();
        let mut record = TimeoutRecord::new("t1".to_string(), TimeoutSpec::new(120_000), start, 1);
        let now = after(start, 10_000);

        let ext = record.apply_extension(30_000, FLOOR, now);

        assert!(!ext.clamped);
        assert_eq!(ext.elapsed_ms, 10_000);
        assert_eq!(ext.new_total_ms, 150_000);
        assert_eq!(record.remaining_ms(now), 140_000);
        assert_eq!(record.activation_time, start);
    }

    #[test]
    fn test_reduction_clamps_to_floor() {
        let start = Instant::now();
        let mut record = TimeoutRecord::new("t1".to_string(), TimeoutSpec::new(90_000), start, 1);
        let now = after(start, 85_000);

        let ext = record.apply_extension(-10_000, FLOOR, now);

        assert!(ext.clamped);
        assert_eq!(ext.requested_total_ms, 80_000);
        assert_eq!(ext.new_total_ms, 145_000);
        assert_eq!(record.remaining_ms(now), FLOOR);
    }

    #[test]
    fn test_small_extension_is_raised_to_floor() {
        let start = Instant::now();
        let mut record = TimeoutRecord::new("t1".to_string(), TimeoutSpec::new(90_000), start, 1);
        let now = after(start, 85_000);

        let ext = record.apply_extension(10_000, FLOOR, now);

        assert!(ext.clamped);
        assert_eq!(record.remaining_ms(now), FLOOR);
    }

    #[test]
    fn test_reduction_above_floor_is_honored() {
        let start = Instant::now();
        let mut record = TimeoutRecord::new("t1".to_string(), TimeoutSpec::new(300_000), start, 1);
        let now = after(start, 10_000);

        let ext = record.apply_extension(-100_000, FLOOR, now);

        assert!(!ext.clamped);
        assert_eq!(record.remaining_ms(now), 190_000);
    }

    #[test]
    fn test_extension_latches_warning_once_offset_passed() {
        let start = Instant::now();
        let spec = TimeoutSpec::new(100_000).with_warning(20_000);
        let mut record = TimeoutRecord::new("t1".to_string(), spec, start, 1);

        record.apply_extension(500_000, FLOOR, after(start, 30_000));

        assert!(record.has_warned);
        assert_eq!(record.warning_delay_ms(after(start, 30_000)), None);
    }

    #[test]
    fn test_extension_at_warning_instant_keeps_warning_due() {
        let start = Instant::now();
        let spec = TimeoutSpec::new(120_000).with_warning(0);
        let mut record = TimeoutRecord::new("t1".to_string(), spec, start, 1);

        record.apply_extension(10_000, FLOOR, start);

        assert!(!record.has_warned);
        assert_eq!(record.warning_delay_ms(start), Some(0));
    }

    #[test]
    fn test_extension_keeps_pending_warning() {
        let start = Instant::now();
        let spec = TimeoutSpec::new(100_000).with_warning(80_000);
        let mut record = TimeoutRecord::new("t1".to_string(), spec, start, 1);
        let now = after(start, 30_000);

        record.apply_extension(60_000, FLOOR, now);

        assert!(!record.has_warned);
        assert_eq!(record.warning_offset_ms, Some(80_000));
        assert_eq!(record.warning_delay_ms(now), Some(50_000));
    }

    #[test]
    fn test_status_snapshot() {
        let start = Instant::now();
        let spec = TimeoutSpec::new(5000).with_warning(2000);
        let record = TimeoutRecord::new("t1".to_string(), spec, start, 3);

        let status = record.status(after(start, 1000));
        assert_eq!(status.id, "t1");
        assert_eq!(status.elapsed_ms, 1000);
        assert_eq!(status.remaining_ms, 4000);
        assert_eq!(status.warning_offset_ms, Some(2000));
        assert!(status.is_active);

        let json = serde_json::to_string(&status).unwrap();
        let back: TimeoutStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
