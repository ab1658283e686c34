//! Cancellable Delayed Tasks
//!
//! A table of one-shot tasks keyed by `K` (entity + purpose in the game
//! layer). Tasks fire in deadline order; equal deadlines fire in the
//! order they were scheduled. At most one task exists per key:
//! scheduling an existing key replaces it.
//!
//! The scheduler never runs anything itself. The owner polls
//! [`Scheduler::pop_due`] with the current simulation time and runs the
//! payload on its own thread.

use std::collections::BTreeMap;

/// Ordering slot of a task: deadline first, then scheduling sequence.
type Slot = (u64, u64);

/// Deadline-ordered table of cancellable tasks.
#[derive(Clone, Debug)]
pub struct Scheduler<K, P> {
    queue: BTreeMap<Slot, (K, P)>,
    index: BTreeMap<K, Slot>,
    next_seq: u64,
}

impl<K, P> Default for Scheduler<K, P> {
    fn default() -> Self {
        Self {
            queue: BTreeMap::new(),
            index: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Ord + Copy, P> Scheduler<K, P> {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `payload` under `key` to fire at `deadline_ms`.
    ///
    /// Returns `true` if an existing task under the same key was replaced.
    pub fn schedule(&mut self, key: K, deadline_ms: u64, payload: P) -> bool {
        let replaced = self.cancel(&key).is_some();

        let slot = (deadline_ms, self.next_seq);
        self.next_seq += 1;

        self.queue.insert(slot, (key, payload));
        self.index.insert(key, slot);

        replaced
    }

    /// Cancel the task under `key`, returning its payload.
    pub fn cancel(&mut self, key: &K) -> Option<P> {
        let slot = self.index.remove(key)?;
        self.queue.remove(&slot).map(|(_, payload)| payload)
    }

    /// Cancel every task whose key matches `predicate`.
    ///
    /// Returns the number of cancelled tasks.
    pub fn cancel_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let doomed: Vec<K> = self.index.keys().filter(|k| predicate(k)).copied().collect();
        for key in &doomed {
            self.cancel(key);
        }
        doomed.len()
    }

    /// Remove and return the earliest task due at `now_ms`, if any.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(K, P)> {
        let (&slot, _) = self.queue.iter().next()?;
        if slot.0 > now_ms {
            return None;
        }

        let (key, payload) = self.queue.remove(&slot)?;
        self.index.remove(&key);
        Some((key, payload))
    }

    /// Deadline of the earliest pending task.
    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Whether a task is pending under `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no task is pending.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut scheduler: Scheduler<u32, &str> = Scheduler::new();
        scheduler.schedule(1, 300, "late");
        scheduler.schedule(2, 100, "early");
        scheduler.schedule(3, 200, "middle");

        assert_eq!(scheduler.pop_due(1000), Some((2, "early")));
        assert_eq!(scheduler.pop_due(1000), Some((3, "middle")));
        assert_eq!(scheduler.pop_due(1000), Some((1, "late")));
        assert_eq!(scheduler.pop_due(1000), None);
    }

    #[test]
    fn test_equal_deadlines_are_fifo() {
        let mut scheduler: Scheduler<u32, u32> = Scheduler::new();
        for key in [5, 1, 9, 3] {
            scheduler.schedule(key, 50, key * 10);
        }

        let fired: Vec<u32> = std::iter::from_fn(|| scheduler.pop_due(50))
            .map(|(key, _)| key)
            .collect();
        assert_eq!(fired, vec![5, 1, 9, 3]);
    }

    #[test]
    fn test_not_due_yet() {
        let mut scheduler: Scheduler<u32, ()> = Scheduler::new();
        scheduler.schedule(1, 500, ());

        assert_eq!(scheduler.pop_due(499), None);
        assert_eq!(scheduler.next_deadline(), Some(500));
        assert!(scheduler.pop_due(500).is_some());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_reschedule_replaces() {
        let mut scheduler: Scheduler<u32, &str> = Scheduler::new();
        assert!(!scheduler.schedule(7, 100, "first"));
        assert!(scheduler.schedule(7, 400, "second"));

        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.pop_due(100), None);
        assert_eq!(scheduler.pop_due(400), Some((7, "second")));
    }

    #[test]
    fn test_cancel() {
        let mut scheduler: Scheduler<u32, &str> = Scheduler::new();
        scheduler.schedule(1, 100, "a");
        scheduler.schedule(2, 100, "b");

        assert_eq!(scheduler.cancel(&1), Some("a"));
        assert_eq!(scheduler.cancel(&1), None);
        assert!(!scheduler.contains(&1));
        assert_eq!(scheduler.pop_due(100), Some((2, "b")));
    }

    #[test]
    fn test_cancel_where() {
        let mut scheduler: Scheduler<(u32, u8), ()> = Scheduler::new();
        scheduler.schedule((1, 0), 10, ());
        scheduler.schedule((1, 1), 10, ());
        scheduler.schedule((2, 0), 10, ());

        let cancelled = scheduler.cancel_where(|(entity, _)| *entity == 1);
        assert_eq!(cancelled, 2);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.contains(&(2, 0)));
    }
}
