//! Per-timeout notification targets

/// Receives threshold-crossing notifications for one timeout.
///
/// Handlers are stored with the record and addressed by id only; the
/// coordinator never calls them while holding its table lock, so a handler
/// may freely query the coordinator from a spawned task.
pub trait TimeoutHandler: Send + Sync {
    /// The deadline was reached
    fn on_timeout(&self, id: &str);

    /// The warning offset was reached with `remaining_ms` left on the clock
    fn on_warning(&self, _id: &str, _remaining_ms: i64) {}

    /// The total duration changed to `new_total_ms` (measured from activation)
    fn on_extended(&self, _id: &str, _new_total_ms: i64) {}
}

/// Handler for callers that only consume the broadcast event stream
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl TimeoutHandler for NoopHandler {
    fn on_timeout(&self, _id: &str) {}
}
