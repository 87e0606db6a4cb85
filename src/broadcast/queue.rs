//! Priority queue with blocking removal.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Queue entry. Ordered so that the max-heap yields the lowest priority
/// first and, among equal priorities, the earliest insertion.
struct Queued<T> {
    priority: i32,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Queued<T> {}

impl<T> PartialOrd for Queued<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Queued<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState<T> {
    heap: BinaryHeap<Queued<T>>,
    next_seq: u64,
}

/// Multi-producer, multi-consumer priority queue.
///
/// Consumers block in `pop_timeout` while producers keep inserting.
pub struct EventQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Insert an item and wake one waiting consumer.
    pub fn push(&self, priority: i32, item: T) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Queued {
            priority,
            seq,
            item,
        });
        self.available.notify_one();
    }

    /// Remove the next item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().heap.pop().map(|q| q.item)
    }

    /// Remove the next item, blocking up to `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(queued) = state.heap.pop() {
                return Some(queued.item);
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return state.heap.pop().map(|q| q.item);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard everything queued.
    pub fn clear(&self) {
        self.state.lock().heap.clear();
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
