//! Waiting store: entries not yet dispatched, highest priority first

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::Priority;

/// Identifier of one enqueued request, unique within its queue instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request waiting for dispatch
///
/// `seq` is stamped by the store on first insertion and kept across
/// re-insertions, so an entry put back after a rate-limit stall keeps its
/// place among peers of the same priority.
#[derive(Debug)]
pub struct WaitingEntry<J> {
    pub id: EntryId,
    pub priority: Priority,
    pub enqueued_at: Instant,
    seq: u64,
    pub job: J,
}

impl<J> WaitingEntry<J> {
    pub fn new(id: EntryId, priority: Priority, job: J) -> Self {
        Self {
            id,
            priority,
            enqueued_at: Instant::now(),
            seq: 0,
            job,
        }
    }

    /// Position among entries of equal priority (lower goes first)
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl<J> Eq for WaitingEntry<J> {}

impl<J> PartialEq for WaitingEntry<J> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<J> Ord for WaitingEntry<J> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier insertion
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<J> PartialOrd for WaitingEntry<J> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of waiting entries
#[derive(Debug)]
pub struct WaitingStore<J> {
    heap: BinaryHeap<WaitingEntry<J>>,
    next_seq: u64,
}

impl<J> Default for WaitingStore<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J> WaitingStore<J> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert a newly enqueued entry behind every waiting peer of equal priority
    pub fn push(&mut self, mut entry: WaitingEntry<J>) {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(entry);
    }

    /// Put a popped entry back at its original position
    pub fn reinsert(&mut self, entry: WaitingEntry<J>) {
        self.heap.push(entry);
    }

    pub fn pop_highest_priority(&mut self) -> Option<WaitingEntry<J>> {
        self.heap.pop()
    }

    pub fn peek_highest_priority(&self) -> Option<&WaitingEntry<J>> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Waiting entries in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &WaitingEntry<J>> {
        self.heap.iter()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.heap.iter().any(|e| e.id == id)
    }

    /// Remove a specific entry, wherever it sits in the order
    pub fn remove(&mut self, id: EntryId) -> Option<WaitingEntry<J>> {
        if !self.contains(id) {
            return None;
        }
        let mut removed = None;
        let kept: Vec<_> = self
            .heap
            .drain()
            .filter_map(|e| {
                if e.id == id {
                    removed = Some(e);
                    None
                } else {
                    Some(e)
                }
            })
            .collect();
        self.heap = kept.into_iter().collect();
        removed
    }

    /// Empty the store, returning entries in dispatch order
    pub fn drain_ordered(&mut self) -> Vec<WaitingEntry<J>> {
        let mut entries = std::mem::take(&mut self.heap).into_sorted_vec();
        entries.reverse();
        entries
    }
}
