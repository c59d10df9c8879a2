//! Per-destination queue of requests waiting for admission.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::domain::priority::Priority;

/// A min-priority queue that is stable among equal priorities.
///
/// Lower priority values come out first; items pushed with the same priority
/// come out in push order.
#[derive(Debug)]
pub struct RequestQueue<T> {
    heap: BinaryHeap<Queued<T>>,
    next_seq: u64,
}

#[derive(Debug)]
struct Queued<T> {
    priority: Priority,
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
    // BinaryHeap is a max-heap, so the comparison is reversed.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Enqueues `item` with the given priority.
    pub fn push(&mut self, priority: Priority, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued {
            priority,
            seq,
            item,
        });
    }

    /// Removes and returns the most urgent item.
    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|queued| queued.item)
    }

    /// The priority of the item [`pop`](Self::pop) would return next.
    pub fn peek_priority(&self) -> Option<Priority> {
        self.heap.peek().map(|queued| queued.priority)
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
