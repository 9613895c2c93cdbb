//! Cooperative timer queue.
//!
//! Tasks are stored as `(fire_at, seq) -> (task, generation)` and handed back
//! in firing order when the host polls. Tasks are never cancelled: the owner
//! compares the stored generation with its current one and drops stale tasks
//! when they come due.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled<T> {
    pub fire_at: u64,
    pub generation: u64,
    pub task: T,
}

#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    queue: BTreeMap<(u64, u64), (T, u64)>,
    next_seq: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self { queue: BTreeMap::new(), next_seq: 0 }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to fire at `fire_at`. Equal fire times keep insertion order.
    pub fn schedule(&mut self, fire_at: u64, generation: u64, task: T) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.queue.insert((fire_at, seq), (task, generation));
    }

    /// Remove and return the earliest task due at or before `now`
    pub fn pop_due(&mut self, now: u64) -> Option<Scheduled<T>> {
        let (&(fire_at, _), _) = self.queue.iter().next()?;
        if fire_at > now {
            return None;
        }
        let ((fire_at, _), (task, generation)) = self.queue.pop_first()?;
        Some(Scheduled { fire_at, generation, task })
    }

    /// Earliest pending fire time, stale tasks included
    pub fn next_fire_at(&self) -> Option<u64> {
        self.queue.keys().next().map(|(fire_at, _)| *fire_at)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_in_fire_order() {
        let mut s = Scheduler::new();
        s.schedule(300, 1, "c");
        s.schedule(100, 1, "a");
        s.schedule(200, 2, "b");

        assert_eq!(s.next_fire_at(), Some(100));
        assert_eq!(s.pop_due(250).map(|t| t.task), Some("a"));
        let b = s.pop_due(250).unwrap();
        assert_eq!((b.task, b.generation, b.fire_at), ("b", 2, 200));
        assert!(s.pop_due(250).is_none());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_same_fire_time_keeps_insertion_order() {
        let mut s = Scheduler::new();
        s.schedule(10, 0, 1);
        s.schedule(10, 0, 2);
        s.schedule(10, 0, 3);
        let order: Vec<i32> = std::iter::from_fn(|| s.pop_due(10).map(|t| t.task)).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(s.is_empty());
    }
}
