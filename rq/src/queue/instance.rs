//! Queue instance task: the single writer for one identifier's state
//!
//! The task owns a [`Dispatcher`] and is woken by enqueues, settlements,
//! cancel/status requests, and a timer at the rate window's reset when
//! stalled. Before each dispatch pass it drains every message already in the
//! channel, so entries submitted together are ordered by priority instead of
//! by arrival.
//!
//! The running task holds no sender of its own. Handles and accepted entries
//! (waiting or in flight) keep the channel open; once all of them are gone
//! the channel closes and the task exits.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use super::config::QueueConfig;
use super::dispatcher::Dispatcher;
use super::error::ConfigError;
use super::executor::{BoxJob, ExecContext, Rejection};
use super::handle::QueueHandle;
use super::messages::{EntrySnapshot, QueueRequest, QueueStatus};
use super::store::WaitingEntry;

/// Replies held back until the dispatch pass that follows them
enum PendingReply {
    Status(oneshot::Sender<QueueStatus>),
    Details(oneshot::Sender<Vec<EntrySnapshot>>),
}

pub struct QueueInstance {
    dispatcher: Dispatcher<BoxJob>,
    tx: mpsc::Sender<QueueRequest>,
    rx: mpsc::Receiver<QueueRequest>,
    next_id: Arc<AtomicU64>,
}

impl QueueInstance {
    /// Create an instance; nothing runs until [`run`](Self::run) is awaited
    pub fn new(identifier: impl Into<String>, config: QueueConfig) -> Result<Self, ConfigError> {
        let dispatcher = Dispatcher::new(identifier, config)?;
        let (tx, rx) = mpsc::channel(dispatcher.config().channel_buffer);
        Ok(Self {
            dispatcher,
            tx,
            rx,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Create an instance and spawn its task, returning a handle to it
    pub fn spawn(identifier: impl Into<String>, config: QueueConfig) -> Result<QueueHandle, ConfigError> {
        let instance = Self::new(identifier, config)?;
        let handle = instance.handle();
        tokio::spawn(instance.run());
        Ok(handle)
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle::new(
            self.dispatcher.identifier().to_string(),
            self.tx.clone(),
            self.next_id.clone(),
        )
    }

    /// Run the instance until shutdown is requested or nothing can reach it
    ///
    /// Handles created with [`handle`](Self::handle) before this call keep it
    /// running; the instance's own sender is dropped here.
    pub async fn run(self) {
        let QueueInstance { dispatcher, rx, .. } = self;
        Actor { dispatcher, rx }.run().await;
    }
}

/// The running side of a [`QueueInstance`]
struct Actor {
    dispatcher: Dispatcher<BoxJob>,
    rx: mpsc::Receiver<QueueRequest>,
}

impl Actor {
    async fn run(mut self) {
        info!(identifier = %self.dispatcher.identifier(), config = ?self.dispatcher.config(), "Queue instance started");

        let mut retry_at: Option<Instant> = None;
        let mut pending = Vec::new();

        loop {
            // None: the rate window reset before any request arrived
            let woke = match retry_at {
                Some(deadline) => tokio::select! {
                    req = self.rx.recv() => Some(req),
                    _ = tokio::time::sleep_until(deadline) => None,
                },
                None => Some(self.rx.recv().await),
            };

            let Some(first) = woke else {
                debug!(identifier = %self.dispatcher.identifier(), "QueueInstance::run: rate window reset");
                retry_at = self.dispatch();
                continue;
            };

            // No handle and no accepted entry left, so the store is empty too
            let Some(first) = first else {
                debug!(identifier = %self.dispatcher.identifier(), "QueueInstance::run: all senders dropped");
                break;
            };

            let mut shutdown = self.handle_request(first, &mut pending);
            while shutdown.is_none() {
                match self.rx.try_recv() {
                    Ok(req) => shutdown = self.handle_request(req, &mut pending),
                    Err(_) => break,
                }
            }

            if shutdown.is_none() {
                retry_at = self.dispatch();
            }
            self.answer(&mut pending);

            if let Some(reply_tx) = shutdown {
                self.shutdown(reply_tx);
                break;
            }
        }

        info!(identifier = %self.dispatcher.identifier(), "Queue instance stopped");
    }

    /// Apply one request; returns the shutdown ack channel when asked to stop
    fn handle_request(
        &mut self,
        req: QueueRequest,
        pending: &mut Vec<PendingReply>,
    ) -> Option<oneshot::Sender<()>> {
        match req {
            QueueRequest::Enqueue { id, priority, job } => {
                self.dispatcher.enqueue(WaitingEntry::new(id, priority, job));
            }

            QueueRequest::Settled { id, outcome } => {
                self.dispatcher.settle(id, outcome);
            }

            QueueRequest::Cancel { id, reply_tx } => {
                let cancelled = match self.dispatcher.cancel(id) {
                    Some(entry) => {
                        entry.job.reject(Rejection::Cancelled);
                        true
                    }
                    None => false,
                };
                let _ = reply_tx.send(cancelled);
            }

            QueueRequest::GetStatus { reply_tx } => pending.push(PendingReply::Status(reply_tx)),

            QueueRequest::GetDetails { reply_tx } => pending.push(PendingReply::Details(reply_tx)),

            QueueRequest::Shutdown { reply_tx } => return Some(reply_tx),
        }
        None
    }

    /// Run one dispatch pass and start every admitted entry
    fn dispatch(&mut self) -> Option<Instant> {
        let ctx = ExecContext {
            timeout: self.dispatcher.config().timeout(),
            abort_on_timeout: self.dispatcher.config().abort_on_timeout,
        };
        let pass = self.dispatcher.dispatch_at(Instant::now());

        for entry in pass.admitted {
            tokio::spawn(entry.job.run(ctx));
        }

        pass.retry_at
    }

    fn answer(&self, pending: &mut Vec<PendingReply>) {
        for reply in pending.drain(..) {
            match reply {
                PendingReply::Status(tx) => {
                    let _ = tx.send(self.dispatcher.status());
                }
                PendingReply::Details(tx) => {
                    let _ = tx.send(self.dispatcher.details(Instant::now()));
                }
            }
        }
    }

    /// Reject everything still waiting; in-flight work settles on its own
    fn shutdown(&mut self, reply_tx: oneshot::Sender<()>) {
        // Handles report closed before the ack arrives
        self.rx.close();

        let waiting = self.dispatcher.drain();
        info!(
            identifier = %self.dispatcher.identifier(),
            rejected = waiting.len(),
            in_flight = self.dispatcher.processing(),
            "Queue instance shutting down"
        );
        for entry in waiting {
            entry.job.reject(Rejection::Shutdown);
        }
        let _ = reply_tx.send(());
    }
}
