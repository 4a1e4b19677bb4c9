//! Priority order of queued operations

use pulse_common::operations::OperationPriority;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingEntry {
    priority: OperationPriority,
    sequence: u64,
    id: Uuid,
}

impl Ord for PendingEntry {
    // Max-heap: higher priority first, then the earlier sequence number
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ids waiting for a worker, `high > normal > low`, FIFO within a class
///
/// Holds queued operations only: cancelling removes the id with `retain`.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    heap: BinaryHeap<PendingEntry>,
    next_sequence: u64,
}

impl PendingQueue {
    pub fn push(&mut self, id: Uuid, priority: OperationPriority) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(PendingEntry {
            priority,
            sequence,
            id,
        });
    }

    pub fn pop(&mut self) -> Option<Uuid> {
        self.heap.pop().map(|entry| entry.id)
    }

    /// Queued operations waiting for a worker
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Drop entries the predicate rejects
    pub fn retain(&mut self, mut keep: impl FnMut(&Uuid) -> bool) {
        self.heap.retain(|entry| keep(&entry.id));
    }
}
