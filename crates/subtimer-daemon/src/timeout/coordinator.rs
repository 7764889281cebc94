//! Timeout coordinator - owns every tracked subtask deadline

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

use subtimer_core::models::{CoordinatorConfig, TimeoutRecord, TimeoutSpec, TimeoutStatus};

use super::events::TimeoutEvent;
use super::handler::TimeoutHandler;
use crate::event_manager::EventManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FireKind {
    Warning,
    Timeout,
}

/// A record together with its notification target and pending timers
struct Slot {
    record: TimeoutRecord,
    handler: Arc<dyn TimeoutHandler>,
    warning_task: Option<JoinHandle<()>>,
    timeout_task: Option<JoinHandle<()>>,
}

impl Slot {
    fn cancel_timers(&mut self) {
        if let Some(task) = self.warning_task.take() {
            task.abort();
        }
        if let Some(task) = self.timeout_task.take() {
            task.abort();
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

#[derive(Default)]
struct Table {
    slots: HashMap<String, Slot>,
    last_generation: u64,
    disposed: bool,
}

/// Tracks deadlines for independently identified subtasks.
///
/// All state sits behind a single mutex, so every public operation is one
/// critical section. Scheduled actions only carry `(id, generation)` and a
/// weak reference to the table; they re-check the live record when they wake
/// and do nothing if it was cleared, replaced or rescheduled meanwhile.
#[derive(Clone)]
pub struct TimeoutCoordinator {
    table: Arc<Mutex<Table>>,
    events: Arc<EventManager>,
    config: CoordinatorConfig,
}

impl TimeoutCoordinator {
    /// Create a new coordinator publishing to `events`.
    ///
    /// The minimum remaining time enforced by `extend` comes from
    /// `config.min_remaining_ms`. Callers load it from the config file or
    /// override it; `CoordinatorConfig::default()` uses 60 000 ms.
    pub fn new(config: CoordinatorConfig, events: Arc<EventManager>) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table::default())),
            events,
            config,
        }
    }

    /// Settings this coordinator was built with
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Subscribe to timeout events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TimeoutEvent> {
        self.events.subscribe()
    }

    /// Start (or restart) the timeout for `id`.
    ///
    /// An existing record for the same id is replaced and its pending timers
    /// cancelled. Nothing is invoked synchronously.
    pub async fn start(
        &self,
        id: impl Into<String>,
        spec: TimeoutSpec,
        handler: Arc<dyn TimeoutHandler>,
    ) {
        let id = id.into();
        let now = Instant::now();

        let mut table = self.table.lock().await;
        if table.disposed {
            tracing::warn!("Ignoring start for {} after dispose", id);
            return;
        }

        if let Some(previous) = table.slots.remove(&id) {
            tracing::debug!(
                "Replacing timeout {} (generation {})",
                id,
                previous.record.generation
            );
        }

        table.last_generation += 1;
        let record = TimeoutRecord::new(id.clone(), spec, now.into_std(), table.last_generation);
        let mut slot = Slot {
            record,
            handler,
            warning_task: None,
            timeout_task: None,
        };
        self.arm(&mut slot, now);
        table.slots.insert(id.clone(), slot);

        tracing::info!(
            "Timeout {} started: {}ms, warning at {:?}",
            id,
            spec.total_duration_ms,
            spec.warning_offset_ms
        );
        self.events.emit(TimeoutEvent::started(
            id,
            spec.total_duration_ms,
            spec.warning_offset_ms,
        ));
    }

    /// Extend (positive delta) or shorten (negative delta) an active timeout.
    ///
    /// Returns false when `id` has no active record. The remaining time never
    /// drops below the configured floor; the requested delta is adjusted to
    /// fit. `handler`, when given, replaces the stored one before re-arming.
    pub async fn extend(
        &self,
        id: &str,
        delta_ms: i64,
        handler: Option<Arc<dyn TimeoutHandler>>,
    ) -> bool {
        let now = Instant::now();

        let (extension, handler) = {
            let mut table = self.table.lock().await;
            let Table {
                slots,
                last_generation,
                ..
            } = &mut *table;

            let Some(slot) = slots.get_mut(id) else {
                return false;
            };
            if !slot.record.is_active {
                return false;
            }

            slot.cancel_timers();
            if let Some(handler) = handler {
                slot.handler = handler;
            }

            let extension = slot.record.apply_extension(
                delta_ms,
                self.config.min_remaining_ms,
                now.into_std(),
            );
            *last_generation += 1;
            slot.record.generation = *last_generation;
            self.arm(slot, now);

            self.events.emit(TimeoutEvent::extended(
                id.to_string(),
                extension.new_total_ms,
                delta_ms,
                extension.clamped,
            ));
            (extension, slot.handler.clone())
        };

        if extension.clamped {
            tracing::info!(
                "Timeout {} adjusted by {}ms, clamped to {}ms total (floor {}ms)",
                id,
                delta_ms,
                extension.new_total_ms,
                self.config.min_remaining_ms
            );
        } else {
            tracing::info!(
                "Timeout {} adjusted by {}ms to {}ms total",
                id,
                delta_ms,
                extension.new_total_ms
            );
        }

        handler.on_extended(id, extension.new_total_ms);
        true
    }

    /// Cancel and remove the timeout for `id`.
    ///
    /// Returns true if an active record existed.
    pub async fn clear(&self, id: &str) -> bool {
        let mut table = self.table.lock().await;
        let Some(slot) = table.slots.remove(id) else {
            return false;
        };

        let was_active = slot.record.is_active;
        if was_active {
            tracing::info!("Timeout {} cleared", id);
            self.events.emit(TimeoutEvent::cleared(id.to_string()));
        }
        was_active
    }

    /// Clear every listed id, returning how many were active
    pub async fn clear_many<I, S>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = self.table.lock().await;
        let mut cleared = 0;

        for id in ids {
            let id = id.as_ref();
            if let Some(slot) = table.slots.remove(id) {
                if slot.record.is_active {
                    self.events.emit(TimeoutEvent::cleared(id.to_string()));
                    cleared += 1;
                }
            }
        }

        tracing::info!("Cleared {} timeouts", cleared);
        cleared
    }

    /// Deactivate and remove every timeout, returning how many were active
    pub async fn clear_all(&self) -> usize {
        let mut table = self.table.lock().await;
        let mut cleared = 0;

        for (id, mut slot) in table.slots.drain() {
            if slot.record.is_active {
                slot.record.is_active = false;
                self.events.emit(TimeoutEvent::cleared(id));
                cleared += 1;
            }
        }

        tracing::info!("Cleared all timeouts ({} active)", cleared);
        cleared
    }

    /// Remaining milliseconds for `id`, or 0 if absent or inactive
    pub async fn time_remaining(&self, id: &str) -> i64 {
        let table = self.table.lock().await;
        table
            .slots
            .get(id)
            .map(|slot| slot.record.remaining_ms(Instant::now().into_std()))
            .unwrap_or(0)
    }

    /// Snapshot of the record for `id`
    pub async fn status(&self, id: &str) -> Option<TimeoutStatus> {
        let table = self.table.lock().await;
        table
            .slots
            .get(id)
            .map(|slot| slot.record.status(Instant::now().into_std()))
    }

    pub async fn is_active(&self, id: &str) -> bool {
        let table = self.table.lock().await;
        table
            .slots
            .get(id)
            .map(|slot| slot.record.is_active)
            .unwrap_or(false)
    }

    /// Ids of every active timeout, in no particular order
    pub async fn active_timeouts(&self) -> Vec<String> {
        let table = self.table.lock().await;
        table
            .slots
            .values()
            .filter(|slot| slot.record.is_active)
            .map(|slot| slot.record.id.clone())
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        let table = self.table.lock().await;
        table
            .slots
            .values()
            .filter(|slot| slot.record.is_active)
            .count()
    }

    /// Cancel everything and leave the coordinator inert
    pub async fn dispose(&self) {
        let mut table = self.table.lock().await;
        table.disposed = true;
        let cancelled = table.slots.len();
        table.slots.clear();

        tracing::info!(
            "Timeout coordinator disposed ({} timeouts cancelled)",
            cancelled
        );
    }

    /// Schedule the slot's pending warning and its deadline, both relative to `now`
    fn arm(&self, slot: &mut Slot, now: Instant) {
        let id = &slot.record.id;
        let generation = slot.record.generation;

        if let Some(delay) = slot.record.warning_delay_ms(now.into_std()) {
            slot.warning_task = Some(self.spawn_fire(
                id.clone(),
                generation,
                FireKind::Warning,
                now,
                delay,
            ));
        }

        let delay = slot.record.timeout_delay_ms(now.into_std());
        slot.timeout_task = Some(self.spawn_fire(
            id.clone(),
            generation,
            FireKind::Timeout,
            now,
            delay,
        ));

        tracing::debug!(
            "Armed timeout {} (generation {}), deadline in {}ms",
            id,
            generation,
            delay
        );
    }

    fn spawn_fire(
        &self,
        id: String,
        generation: u64,
        kind: FireKind,
        now: Instant,
        delay_ms: i64,
    ) -> JoinHandle<()> {
        // Non-positive delays fire on the next scheduler pass
        let deadline = now + Duration::from_millis(delay_ms.max(0) as u64);
        let table = Arc::downgrade(&self.table);
        let events = self.events.clone();

        tokio::spawn(async move {
            sleep_until(deadline).await;
            Self::fire(table, events, id, generation, kind).await;
        })
    }

    async fn fire(
        table: Weak<Mutex<Table>>,
        events: Arc<EventManager>,
        id: String,
        generation: u64,
        kind: FireKind,
    ) {
        let Some(table) = table.upgrade() else {
            return;
        };
        let mut guard = table.lock().await;

        let current = guard
            .slots
            .get(&id)
            .map(|slot| slot.record.is_active && slot.record.generation == generation)
            .unwrap_or(false);
        if !current {
            tracing::debug!(
                "Suppressed stale {:?} for timeout {} (generation {})",
                kind,
                id,
                generation
            );
            return;
        }

        match kind {
            FireKind::Warning => {
                let Some(slot) = guard.slots.get_mut(&id) else {
                    return;
                };
                if slot.record.has_warned {
                    return;
                }
                slot.record.has_warned = true;
                // Detach our own handle rather than aborting it
                drop(slot.warning_task.take());

                let remaining = slot.record.remaining_ms(Instant::now().into_std());
                let handler = slot.handler.clone();
                events.emit(TimeoutEvent::warning(id.clone(), remaining));
                drop(guard);

                tracing::info!("Timeout {} warning, {}ms remaining", id, remaining);
                handler.on_warning(&id, remaining);
            }
            FireKind::Timeout => {
                let Some(mut slot) = guard.slots.remove(&id) else {
                    return;
                };
                slot.record.is_active = false;
                drop(slot.timeout_task.take());

                let handler = slot.handler.clone();
                events.emit(TimeoutEvent::expired(id.clone()));
                // Dropping the slot aborts a warning that never got to fire
                drop(slot);
                drop(guard);

                tracing::info!("Timeout {} expired", id);
                handler.on_timeout(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout::{NoopHandler, TimeoutEventType};

    fn coordinator() -> TimeoutCoordinator {
        TimeoutCoordinator::new(CoordinatorConfig::default(), Arc::new(EventManager::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_registers_timeout() {
        let coordinator = coordinator();

        coordinator
            .start("t1", TimeoutSpec::new(5000), Arc::new(NoopHandler))
            .await;

        assert!(coordinator.is_active("t1").await);
        assert_eq!(coordinator.time_remaining("t1").await, 5000);
        assert_eq!(coordinator.active_timeouts().await, vec!["t1".to_string()]);
        assert_eq!(coordinator.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_emits_event() {
        let coordinator = coordinator();
        let mut rx = coordinator.subscribe();

        coordinator
            .start(
                "t1",
                TimeoutSpec::new(5000).with_warning(2000),
                Arc::new(NoopHandler),
            )
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.timeout_id, "t1");
        assert_eq!(
            event.event_type,
            TimeoutEventType::Started {
                total_duration_ms: 5000,
                warning_offset_ms: Some(2000),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_on_absent_id() {
        let coordinator = coordinator();

        assert!(!coordinator.is_active("missing").await);
        assert_eq!(coordinator.time_remaining("missing").await, 0);
        assert!(coordinator.status("missing").await.is_none());
        assert!(!coordinator.extend("missing", 1000, None).await);
        assert!(!coordinator.clear("missing").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_increases_on_restart_and_extend() {
        let coordinator = coordinator();
        let handler: Arc<dyn TimeoutHandler> = Arc::new(NoopHandler);

        coordinator.start("t1", TimeoutSpec::new(120_000), handler.clone()).await;
        let first = coordinator.table.lock().await.slots["t1"].record.generation;

        coordinator.extend("t1", 10_000, None).await;
        let second = coordinator.table.lock().await.slots["t1"].record.generation;

        coordinator.start("t1", TimeoutSpec::new(120_000), handler).await;
        let third = coordinator.table.lock().await.slots["t1"].record.generation;

        assert!(first < second);
        assert!(second < third);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_with_outdated_generation_is_suppressed() {
        let coordinator = coordinator();
        let mut rx = coordinator.subscribe();

        coordinator
            .start(
                "t1",
                TimeoutSpec::new(5000).with_warning(1000),
                Arc::new(NoopHandler),
            )
            .await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // Timers already in flight still carry the old generation
        coordinator
            .table
            .lock()
            .await
            .slots
            .get_mut("t1")
            .unwrap()
            .record
            .generation += 1;

        tokio::time::advance(Duration::from_millis(10_000)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let event = rx.try_recv().unwrap();
        assert!(matches!(event.event_type, TimeoutEventType::Started { .. }));
        assert!(rx.try_recv().is_err());

        assert!(coordinator.is_active("t1").await);
        assert!(!coordinator.status("t1").await.unwrap().has_warned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_snapshot() {
        let coordinator = coordinator();

        coordinator
            .start(
                "t1",
                TimeoutSpec::new(90_000).with_warning(30_000),
                Arc::new(NoopHandler),
            )
            .await;
        tokio::time::advance(Duration::from_millis(10_000)).await;

        let status = coordinator.status("t1").await.unwrap();
        assert_eq!(status.elapsed_ms, 10_000);
        assert_eq!(status.remaining_ms, 80_000);
        assert_eq!(status.total_duration_ms, 90_000);
        assert!(!status.has_warned);
        assert!(status.is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_many() {
        let coordinator = coordinator();
        let handler: Arc<dyn TimeoutHandler> = Arc::new(NoopHandler);

        for id in ["a", "b", "c"] {
            coordinator.start(id, TimeoutSpec::new(120_000), handler.clone()).await;
        }

        let cleared = coordinator.clear_many(["a", "c", "missing"]).await;
        assert_eq!(cleared, 2);
        assert_eq!(coordinator.active_timeouts().await, vec!["b".to_string()]);
    }
}
