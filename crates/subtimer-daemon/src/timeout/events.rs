//! Timeout events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event emitted by the timeout coordinator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutEvent {
    pub event_type: TimeoutEventType,
    pub timeout_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Types of timeout events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeoutEventType {
    /// Timeout armed (or re-armed by a fresh start)
    Started {
        total_duration_ms: i64,
        warning_offset_ms: Option<i64>,
    },
    /// Warning threshold crossed
    Warning { remaining_ms: i64 },
    /// Deadline reached
    Expired,
    /// Duration changed by an extension or reduction
    Extended {
        new_total_ms: i64,
        requested_delta_ms: i64,
        clamped: bool,
    },
    /// Timeout cancelled before expiry
    Cleared,
}

impl TimeoutEvent {
    /// Create a new timeout event
    pub fn new(event_type: TimeoutEventType, timeout_id: String) -> Self {
        Self {
            event_type,
            timeout_id,
            timestamp: Utc::now(),
        }
    }

    pub fn started(
        timeout_id: String,
        total_duration_ms: i64,
        warning_offset_ms: Option<i64>,
    ) -> Self {
        Self::new(
            TimeoutEventType::Started {
                total_duration_ms,
                warning_offset_ms,
            },
            timeout_id,
        )
    }

    pub fn warning(timeout_id: String, remaining_ms: i64) -> Self {
        Self::new(TimeoutEventType::Warning { remaining_ms }, timeout_id)
    }

    pub fn expired(timeout_id: String) -> Self {
        Self::new(TimeoutEventType::Expired, timeout_id)
    }

    pub fn extended(
        timeout_id: String,
        new_total_ms: i64,
        requested_delta_ms: i64,
        clamped: bool,
    ) -> Self {
        Self::new(
            TimeoutEventType::Extended {
                new_total_ms,
                requested_delta_ms,
                clamped,
            },
            timeout_id,
        )
    }

    pub fn cleared(timeout_id: String) -> Self {
        Self::new(TimeoutEventType::Cleared, timeout_id)
    }
}
