//! Central event broadcasting

use tokio::sync::broadcast;

use crate::timeout::TimeoutEvent;

/// Fans timeout events out to every subscriber
pub struct EventManager {
    event_tx: broadcast::Sender<TimeoutEvent>,
}

impl EventManager {
    /// Create a new event manager with a broadcast channel
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    /// Subscribe to all timeout events
    pub fn subscribe(&self) -> broadcast::Receiver<TimeoutEvent> {
        self.event_tx.subscribe()
    }

    /// Emit a timeout event; dropped silently when nobody is listening
    pub fn emit(&self, event: TimeoutEvent) {
        tracing::trace!(
            "EventManager: {:?} for {} ({} subscribers)",
            event.event_type,
            event.timeout_id,
            self.event_tx.receiver_count()
        );
        let _ = self.event_tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout::TimeoutEventType;

    #[test]
    fn test_event_manager_creation() {
        let manager = EventManager::new();
        assert_eq!(manager.subscriber_count(), 0);

        let _receiver = manager.subscribe();
        assert_eq!(manager.subscriber_count(), 1);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let manager = EventManager::with_capacity(4);
        manager.emit(TimeoutEvent::expired("t1".to_string()));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let manager = EventManager::new();
        let mut receiver1 = manager.subscribe();
        let mut receiver2 = manager.subscribe();

        manager.emit(TimeoutEvent::warning("t1".to_string(), 3000));

        // Both subscribers should receive the event
        let received1 = receiver1.recv().await.unwrap();
        let received2 = receiver2.recv().await.unwrap();

        assert_eq!(received1, received2);
        assert!(matches!(
            received1.event_type,
            TimeoutEventType::Warning { remaining_ms: 3000 }
        ));
    }
}
