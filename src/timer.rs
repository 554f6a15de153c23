//! A queue of deferred actions sorted by time.
//!
//! Stores items of type `T` keyed by an `f64` due time. The controller uses
//! it for time-based UI behavior such as notification expiry. Time is
//! whatever clock the caller advances; nothing in here sleeps. Adding a
//! timer is *O*(log(*n*)); cancellation is *O*(1).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// A monotonic queue of timers. If two timers share a due time, the one
/// scheduled earlier fires first.
pub struct TimerQueue<T> {
    queue: BinaryHeap<Entry>,
    data_map: HashMap<u64, T>,
    timer_counter: u64,
}

impl<T> TimerQueue<T> {
    #[must_use]
    pub fn new() -> TimerQueue<T> {
        TimerQueue {
            queue: BinaryHeap::new(),
            data_map: HashMap::new(),
            timer_counter: 0,
        }
    }

    /// Schedules `data` to fire at `time`. Returns an id usable with
    /// [`TimerQueue::cancel`].
    pub fn schedule(&mut self, time: f64, data: T) -> TimerId {
        let id = self.timer_counter;
        self.queue.push(Entry { time, id });
        self.data_map.insert(id, data);
        self.timer_counter += 1;
        TimerId { id }
    }

    /// Cancels a pending timer. Cancelling a timer that already fired or was
    /// already cancelled is a no-op.
    pub fn cancel(&mut self, id: &TimerId) {
        // Leave the heap entry in place; it is skipped when popped.
        self.data_map.remove(&id.id);
    }

    /// The due time of the earliest pending timer, if any.
    #[must_use]
    pub fn next_due(&self) -> Option<f64> {
        self.queue
            .iter()
            .filter(|entry| self.data_map.contains_key(&entry.id))
            .map(|entry| entry.time)
            .min_by(f64::total_cmp)
    }

    /// Pops every timer due at or before `now`, in firing order.
    pub fn pop_due(&mut self, now: f64) -> Vec<T> {
        let mut due = Vec::new();
        while self.queue.peek().is_some_and(|entry| entry.time <= now) {
            let Some(entry) = self.queue.pop() else { break };
            // Cancelled timers have no data and are skipped.
            if let Some(data) = self.data_map.remove(&entry.id) {
                due.push(data);
            }
        }
        due
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_map.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.data_map.clear();
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An opaque handle to a scheduled timer.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct TimerId {
    id: u64,
}

/// Heap entries are ordered by increasing time, then by increasing id, so
/// `BinaryHeap` (a max-heap) pops the earliest first.
#[derive(PartialEq, Debug)]
struct Entry {
    time: f64,
    id: u64,
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.total_cmp(&other.time).reverse() {
            Ordering::Equal => self.id.cmp(&other.id).reverse(),
            time_ordering => time_ordering,
        }
    }
}
