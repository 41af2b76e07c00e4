//! Concurrency tracker
//!
//! Counts in-flight executions per task type. Capacity is reserved before a
//! batch is fetched and handed out as [`Permit`]s, one per dispatched task.
//! Dropping a permit releases its slot, so release happens exactly once on
//! every path, panics included.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::registry::TaskTypeRegistry;

/// In-flight execution counts per task type
#[derive(Default)]
pub struct ConcurrencyTracker {
    running: RwLock<HashMap<String, usize>>,
}

impl ConcurrencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots of `name` currently held
    ///
    /// A slot is held from [`Self::try_reserve`] until its [`Permit`] drops,
    /// so a reservation for a poll still in flight already counts.
    pub fn running(&self, name: &str) -> usize {
        self.running.read().get(name).copied().unwrap_or(0)
    }

    /// Free slots of `name`: capacity minus running, never negative
    pub fn available(&self, registry: &TaskTypeRegistry, name: &str) -> usize {
        registry
            .with_capacity(name, |capacity| capacity.saturating_sub(self.running(name)))
            .unwrap_or(0)
    }

    /// Reserves up to `max` free slots of `name`
    ///
    /// Capacity and running count are read and updated in one critical
    /// section, so concurrent callers can never reserve past capacity.
    ///
    /// # Returns
    /// One permit per reserved slot; empty when nothing is available or the
    /// type is not registered
    pub fn try_reserve(
        self: &Arc<Self>,
        registry: &TaskTypeRegistry,
        name: &str,
        max: usize,
    ) -> Vec<Permit> {
        let reserved = registry
            .with_capacity(name, |capacity| {
                let mut running = self.running.write();
                let count = running.entry(name.to_string()).or_insert(0);
                let n = capacity.saturating_sub(*count).min(max);
                *count += n;
                n
            })
            .unwrap_or(0);

        (0..reserved)
            .map(|_| Permit {
                tracker: Arc::clone(self),
                task_type: name.to_string(),
            })
            .collect()
    }

    fn release(&self, name: &str) {
        let mut running = self.running.write();
        if let Some(count) = running.get_mut(name) {
            *count = count.saturating_sub(1);
        }
    }
}

/// One reserved execution slot
///
/// The slot is released when the permit is dropped.
pub struct Permit {
    tracker: Arc<ConcurrencyTracker>,
    task_type: String,
}

impl Permit {
    pub fn task_type(&self) -> &str {
        &self.task_type
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.tracker.release(&self.task_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::TaskOutput;
    use crate::worker::Worker;
    use courier_core::dto::poll::PollTimeout;

    fn setup(capacity: usize) -> (TaskTypeRegistry, Arc<ConcurrencyTracker>) {
        let registry = TaskTypeRegistry::new(PollTimeout::ServerDefault);
        let worker = Worker::from_fn("echo", |_ctx, task| async move {
            TaskOutput::completed(task.input_data)
        })
        .with_batch_size(capacity);
        registry.register(&worker).unwrap();
        (registry, Arc::new(ConcurrencyTracker::new()))
    }

    #[test]
    fn test_reserve_never_exceeds_capacity() {
        let (registry, tracker) = setup(3);

        let first = tracker.try_reserve(&registry, "echo", 2);
        assert_eq!(first.len(), 2);
        assert_eq!(tracker.available(&registry, "echo"), 1);

        let second = tracker.try_reserve(&registry, "echo", 5);
        assert_eq!(second.len(), 1);
        assert!(tracker.try_reserve(&registry, "echo", 5).is_empty());
        assert_eq!(tracker.running("echo"), 3);
    }

    #[test]
    fn test_dropping_permits_releases_slots() {
        let (registry, tracker) = setup(2);

        let mut permits = tracker.try_reserve(&registry, "echo", 2);
        assert_eq!(permits[0].task_type(), "echo");
        permits.pop();
        assert_eq!(tracker.running("echo"), 1);

        drop(permits);
        assert_eq!(tracker.running("echo"), 0);
        assert_eq!(tracker.available(&registry, "echo"), 2);
    }

    #[test]
    fn test_available_is_zero_when_over_capacity() {
        let (registry, tracker) = setup(2);
        let _permits = tracker.try_reserve(&registry, "echo", 2);

        registry.decrease_capacity("echo", 1).unwrap();
        assert_eq!(tracker.available(&registry, "echo"), 0);
        assert!(tracker.try_reserve(&registry, "echo", 1).is_empty());
    }

    #[test]
    fn test_reserved_slots_count_as_running() {
        let (registry, tracker) = setup(4);

        let reserved = tracker.try_reserve(&registry, "echo", usize::MAX);
        assert_eq!(reserved.len(), 4);
        assert_eq!(tracker.running("echo"), 4);
        assert_eq!(tracker.available(&registry, "echo"), 0);

        // a poll that came back with one task keeps one permit
        let mut reserved = reserved;
        let kept = reserved.pop();
        drop(reserved);
        assert_eq!(tracker.running("echo"), 1);
        drop(kept);
        assert_eq!(tracker.running("echo"), 0);
    }

    #[test]
    fn test_concurrent_reservations_never_exceed_capacity() {
        const CAPACITY: usize = 5;
        const THREADS: usize = 16;
        let (registry, tracker) = setup(CAPACITY);
        let barrier = std::sync::Barrier::new(THREADS);

        let held: Vec<Vec<Permit>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        let mut held = Vec::new();
                        for _ in 0..100 {
                            let mut permits = tracker.try_reserve(&registry, "echo", 2);
                            assert!(tracker.running("echo") <= CAPACITY);
                            held.append(&mut permits);
                        }
                        held
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let total: usize = held.iter().map(Vec::len).sum();
        assert_eq!(total, CAPACITY);
        assert_eq!(tracker.running("echo"), CAPACITY);

        drop(held);
        assert_eq!(tracker.running("echo"), 0);
    }

    #[test]
    fn test_unknown_type_reserves_nothing() {
        let (registry, tracker) = setup(1);
        assert!(tracker.try_reserve(&registry, "missing", 1).is_empty());
        assert_eq!(tracker.available(&registry, "missing"), 0);
    }
}
