//! Pending request queue.
//!
//! Requests are ordered by priority (higher values first), then by enqueue
//! order (FIFO within the same priority level). Each queue owns its sequence
//! counter, so independent admins do not share ordering state.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::request::Priority;

/// An item waiting for a dispatch slot.
#[derive(Debug)]
pub struct Queued<T> {
    pub item: T,
    pub priority: Priority,
    sequence: u64,
    enqueued_at: Instant,
}

impl<T> Queued<T> {
    /// How long the item has been waiting.
    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
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
        // Max-heap: higher priority wins, then the lower (older) sequence.
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// Priority queue of pending requests.
#[derive(Debug)]
pub struct RequestQueue<T> {
    heap: BinaryHeap<Queued<T>>,
    next_sequence: u64,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    pub fn push(&mut self, item: T, priority: Priority) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Queued {
            item,
            priority,
            sequence,
            enqueued_at: Instant::now(),
        });
    }

    pub fn pop(&mut self) -> Option<Queued<T>> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
