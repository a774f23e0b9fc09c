//! Dispatcher: admission decisions for one queue instance
//!
//! Owns the waiting store, the rate limiter and the processing set. It has no
//! channels and no clock of its own, so every transition happens through
//! `&mut self` and the single-writer rule is enforced by the borrow checker.
//! The instance task drives it.

use std::collections::HashMap;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::QueueConfig;
use super::error::ConfigError;
use super::executor::{Abandonable, Outcome};
use super::limiter::RateLimiter;
use super::messages::{EntrySnapshot, EntryStatus, QueueStats, QueueStatus};
use super::store::{EntryId, WaitingEntry, WaitingStore};

use crate::domain::Priority;

/// Result of one dispatch pass
#[derive(Debug)]
pub struct DispatchPass<J> {
    /// Entries moved to processing, in dispatch order
    pub admitted: Vec<WaitingEntry<J>>,

    /// Set when the pass stopped on the rate limit: when to try again
    pub retry_at: Option<Instant>,
}

/// In-flight entry bookkeeping
#[derive(Debug, Clone, Copy)]
struct Processing {
    priority: Priority,
    started_at: Instant,
}

pub struct Dispatcher<J> {
    identifier: String,
    config: QueueConfig,
    store: WaitingStore<J>,
    limiter: RateLimiter,
    processing: HashMap<EntryId, Processing>,
    stats: QueueStats,
}

impl<J: Abandonable> Dispatcher<J> {
    /// Create a dispatcher, rejecting unusable configuration
    pub fn new(identifier: impl Into<String>, config: QueueConfig) -> Result<Self, ConfigError> {
        let identifier = identifier.into();
        config.validate().map_err(|e| ConfigError::Queue {
            identifier: identifier.clone(),
            source: Box::new(e),
        })?;
        debug!(%identifier, ?config, "Dispatcher::new: called");

        Ok(Self {
            limiter: RateLimiter::new(config.rate_limit_count, config.rate_window()),
            identifier,
            config,
            store: WaitingStore::new(),
            processing: HashMap::new(),
            stats: QueueStats::default(),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn queued(&self) -> usize {
        self.store.len()
    }

    pub fn processing(&self) -> usize {
        self.processing.len()
    }

    pub fn is_processing(&self, id: EntryId) -> bool {
        self.processing.contains_key(&id)
    }

    /// Add a new entry to the waiting store
    pub fn enqueue(&mut self, entry: WaitingEntry<J>) {
        debug!(identifier = %self.identifier, id = %entry.id, priority = %entry.priority, "Dispatcher::enqueue: called");
        self.store.push(entry);
        self.stats.total_enqueued += 1;
        self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(self.store.len());
    }

    /// Promote waiting entries into processing while concurrency and rate budget allow
    pub fn dispatch_at(&mut self, now: Instant) -> DispatchPass<J> {
        let mut admitted = Vec::new();
        let mut retry_at = None;

        while self.processing.len() < self.config.max_concurrent {
            let Some(entry) = self.store.pop_highest_priority() else {
                break;
            };

            if entry.job.is_abandoned() {
                debug!(identifier = %self.identifier, id = %entry.id, "Dispatcher::dispatch_at: caller gone, skipping");
                self.stats.total_abandoned += 1;
                continue;
            }

            if !self.limiter.try_admit_at(&self.identifier, now) {
                debug!(identifier = %self.identifier, id = %entry.id, "Dispatcher::dispatch_at: rate limited, re-queueing");
                self.store.reinsert(entry);
                self.stats.total_rate_limited += 1;
                retry_at = self.limiter.window_reset_at(&self.identifier);
                break;
            }

            let waited = now.saturating_duration_since(entry.enqueued_at);
            self.processing.insert(
                entry.id,
                Processing {
                    priority: entry.priority,
                    started_at: now,
                },
            );
            self.stats.total_dispatched += 1;
            self.stats.total_wait_time_ms += waited.as_millis() as u64;
            self.stats.peak_concurrent = self.stats.peak_concurrent.max(self.processing.len());

            debug!(identifier = %self.identifier, id = %entry.id, priority = %entry.priority, ?waited, "Dispatched");
            admitted.push(entry);
        }

        DispatchPass { admitted, retry_at }
    }

    /// Release a processing slot. Returns false if `id` was not processing.
    pub fn settle(&mut self, id: EntryId, outcome: Outcome) -> bool {
        if self.processing.remove(&id).is_none() {
            warn!(identifier = %self.identifier, %id, %outcome, "Dispatcher::settle: entry not processing");
            return false;
        }

        match outcome {
            Outcome::Resolved => self.stats.total_resolved += 1,
            Outcome::Failed => self.stats.total_failed += 1,
            Outcome::TimedOut => self.stats.total_timed_out += 1,
            Outcome::Panicked => self.stats.total_panicked += 1,
        }
        debug!(identifier = %self.identifier, %id, %outcome, "Settled");
        true
    }

    /// Take a still-waiting entry out of the store
    pub fn cancel(&mut self, id: EntryId) -> Option<WaitingEntry<J>> {
        let entry = self.store.remove(id);
        if entry.is_some() {
            self.stats.total_cancelled += 1;
            debug!(identifier = %self.identifier, %id, "Dispatcher::cancel: removed from store");
        } else {
            debug!(identifier = %self.identifier, %id, "Dispatcher::cancel: not waiting");
        }
        entry
    }

    /// Empty the waiting store for shutdown, in dispatch order
    pub fn drain(&mut self) -> Vec<WaitingEntry<J>> {
        let entries = self.store.drain_ordered();
        self.stats.total_cancelled += entries.len() as u64;
        entries
    }

    pub fn status(&self) -> QueueStatus {
        let queued = self.store.len();
        let processing = self.processing.len();
        QueueStatus {
            identifier: self.identifier.clone(),
            queued,
            processing,
            total: queued + processing,
            rate_limited: self.limiter.is_exhausted(&self.identifier),
            stats: self.stats.clone(),
            taken_at: Utc::now(),
        }
    }

    /// Every processing and waiting entry; processing first, each group in priority order
    pub fn details(&self, now: Instant) -> Vec<EntrySnapshot> {
        let mut entries: Vec<_> = self
            .processing
            .iter()
            .map(|(id, p)| EntrySnapshot {
                id: *id,
                priority: p.priority,
                status: EntryStatus::Processing,
                elapsed_ms: now.saturating_duration_since(p.started_at).as_millis() as u64,
            })
            .collect();
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

        let mut waiting: Vec<_> = self.store.iter().collect();
        waiting.sort_by(|a, b| b.cmp(a));
        entries.extend(waiting.into_iter().map(|e| EntrySnapshot {
            id: e.id,
            priority: e.priority,
            status: EntryStatus::Waiting,
            elapsed_ms: now.saturating_duration_since(e.enqueued_at).as_millis() as u64,
        }));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Test payload: abandoned flag only
    #[derive(Debug, Default)]
    struct Stub {
        abandoned: bool,
    }

    impl Abandonable for Stub {
        fn is_abandoned(&self) -> bool {
            self.abandoned
        }
    }

    fn config(max_concurrent: usize, rate_limit_count: u32, rate_window_ms: u64) -> QueueConfig {
        QueueConfig {
            max_concurrent,
            rate_limit_count,
            rate_window_ms,
            ..Default::default()
        }
    }

    fn push(dispatcher: &mut Dispatcher<Stub>, id: u64, priority: i32) {
        dispatcher.enqueue(WaitingEntry::new(EntryId(id), Priority(priority), Stub::default()));
    }

    fn ids(pass: &DispatchPass<Stub>) -> Vec<u64> {
        pass.admitted.iter().map(|e| e.id.0).collect()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = Dispatcher::<Stub>::new("bad", config(0, 1, 1000));
        assert!(matches!(
            result,
            Err(ConfigError::Queue { ref identifier, ref source }) if identifier == "bad" && **source == ConfigError::ZeroConcurrency
        ));
    }

    #[test]
    fn test_concurrent_limit() {
        let mut dispatcher = Dispatcher::new("fast", config(2, 100, 60_000)).unwrap();
        for id in 1..=3 {
            push(&mut dispatcher, id, 0);
        }

        let now = Instant::now();
        let pass = dispatcher.dispatch_at(now);
        assert_eq!(ids(&pass), vec![1, 2]);
        assert_eq!(pass.retry_at, None);
        assert_eq!(dispatcher.processing(), 2);
        assert_eq!(dispatcher.queued(), 1);

        // Full: nothing moves until a slot is released
        assert!(dispatcher.dispatch_at(now).admitted.is_empty());

        assert!(dispatcher.settle(EntryId(1), Outcome::Resolved));
        let pass = dispatcher.dispatch_at(now);
        assert_eq!(ids(&pass), vec![3]);
        assert_eq!(dispatcher.status().stats.peak_concurrent, 2);
    }

    #[test]
    fn test_priority_ordering() {
        let mut dispatcher = Dispatcher::new("fast", config(1, 100, 60_000)).unwrap();
        push(&mut dispatcher, 1, 0);
        push(&mut dispatcher, 2, 5);
        push(&mut dispatcher, 3, 10);

        let now = Instant::now();
        let mut order = Vec::new();
        for _ in 0..3 {
            let pass = dispatcher.dispatch_at(now);
            let id = pass.admitted[0].id;
            order.push(id.0);
            dispatcher.settle(id, Outcome::Resolved);
        }
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_rate_limit_stall_keeps_position() {
        let mut dispatcher = Dispatcher::new("slow", config(10, 2, 1000)).unwrap();
        for id in 1..=3 {
            push(&mut dispatcher, id, 1);
        }

        let start = Instant::now();
        let pass = dispatcher.dispatch_at(start);
        assert_eq!(ids(&pass), vec![1, 2]);
        assert_eq!(pass.retry_at, Some(start + Duration::from_millis(1000)));

        // A later peer of equal priority must not overtake the stalled entry
        push(&mut dispatcher, 4, 1);
        assert!(dispatcher.dispatch_at(start + Duration::from_millis(500)).admitted.is_empty());

        let pass = dispatcher.dispatch_at(start + Duration::from_millis(1000));
        assert_eq!(ids(&pass), vec![3, 4]);
        assert_eq!(dispatcher.status().stats.total_rate_limited, 2);
    }

    #[test]
    fn test_abandoned_entries_skipped_without_budget() {
        let mut dispatcher = Dispatcher::new("fast", config(5, 1, 60_000)).unwrap();
        dispatcher.enqueue(WaitingEntry::new(EntryId(1), Priority(9), Stub { abandoned: true }));
        push(&mut dispatcher, 2, 0);

        let pass = dispatcher.dispatch_at(Instant::now());
        assert_eq!(ids(&pass), vec![2]);
        assert_eq!(dispatcher.status().stats.total_abandoned, 1);
        assert_eq!(dispatcher.queued(), 0);
    }

    #[test]
    fn test_settle_exactly_once() {
        let mut dispatcher = Dispatcher::new("fast", config(1, 10, 60_000)).unwrap();
        push(&mut dispatcher, 1, 0);
        dispatcher.dispatch_at(Instant::now());

        assert!(dispatcher.is_processing(EntryId(1)));
        assert!(dispatcher.settle(EntryId(1), Outcome::TimedOut));
        assert!(!dispatcher.settle(EntryId(1), Outcome::Resolved));

        let stats = dispatcher.status().stats;
        assert_eq!(stats.total_timed_out, 1);
        assert_eq!(stats.total_resolved, 0);
        assert_eq!(dispatcher.processing(), 0);
    }

    #[test]
    fn test_cancel_only_waiting() {
        let mut dispatcher = Dispatcher::new("fast", config(1, 10, 60_000)).unwrap();
        push(&mut dispatcher, 1, 0);
        push(&mut dispatcher, 2, 0);
        dispatcher.dispatch_at(Instant::now());

        assert!(dispatcher.cancel(EntryId(1)).is_none());
        assert_eq!(dispatcher.cancel(EntryId(2)).map(|e| e.id), Some(EntryId(2)));
        assert_eq!(dispatcher.status().stats.total_cancelled, 1);
    }

    #[test]
    fn test_status_and_details() {
        let mut dispatcher = Dispatcher::new("fast", config(1, 10, 60_000)).unwrap();
        push(&mut dispatcher, 1, 0);
        push(&mut dispatcher, 2, 3);
        push(&mut dispatcher, 3, 7);

        let now = Instant::now();
        dispatcher.dispatch_at(now);

        let status = dispatcher.status();
        assert_eq!((status.queued, status.processing, status.total), (2, 1, 3));
        assert_eq!(status.stats.peak_queue_depth, 3);

        let details = dispatcher.details(now);
        let listing: Vec<_> = details.iter().map(|e| (e.id.0, e.status)).collect();
        assert_eq!(
            listing,
            vec![
                (3, EntryStatus::Processing),
                (2, EntryStatus::Waiting),
                (1, EntryStatus::Waiting),
            ]
        );
    }

    #[test]
    fn test_drain() {
        let mut dispatcher = Dispatcher::new("fast", config(1, 10, 60_000)).unwrap();
        push(&mut dispatcher, 1, 0);
        push(&mut dispatcher, 2, 4);

        let drained: Vec<_> = dispatcher.drain().into_iter().map(|e| e.id.0).collect();
        assert_eq!(drained, vec![2, 1]);
        assert_eq!(dispatcher.queued(), 0);
    }
}
