//! Execution wrapper: runs dispatched work under a timeout
//!
//! Work is spawned as its own task and raced against the timer. If the timer
//! wins, the caller gets [`QueueError::Timeout`] and the work task is left to
//! finish in the background with its result discarded, unless the queue is
//! configured to abort it.

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::error::QueueError;
use super::messages::QueueRequest;
use super::store::EntryId;

/// How a dispatched entry settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Resolved,
    Failed,
    TimedOut,
    Panicked,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed-out"),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}

/// Why a waiting entry was rejected without running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Cancelled,
    Shutdown,
}

/// Releases an entry's processing slot by telling its queue instance it settled
///
/// Created at submit time and carried by the entry, so the instance's channel
/// stays open while any accepted entry is waiting or in flight.
pub struct SettleNotifier {
    id: EntryId,
    tx: mpsc::Sender<QueueRequest>,
}

impl SettleNotifier {
    pub(crate) fn new(id: EntryId, tx: mpsc::Sender<QueueRequest>) -> Self {
        Self { id, tx }
    }

    async fn notify(self, outcome: Outcome) {
        // The instance may already be shut down; the caller still gets its result
        if self.tx.send(QueueRequest::Settled { id: self.id, outcome }).await.is_err() {
            debug!(id = %self.id, "SettleNotifier::notify: queue closed");
        }
    }
}

/// Everything a job needs to execute once dispatched
#[derive(Debug, Clone, Copy)]
pub struct ExecContext {
    pub timeout: Duration,
    pub abort_on_timeout: bool,
}

/// A type-erased waiting entry payload: the work plus its result channel
pub trait Job: Send {
    /// Run the work under the context's timeout, release the slot, then deliver the result
    fn run(self: Box<Self>, ctx: ExecContext) -> BoxFuture<'static, ()>;

    /// Settle the entry without running it
    fn reject(self: Box<Self>, reason: Rejection);

    /// The caller dropped its ticket; nobody is waiting for the result
    fn is_abandoned(&self) -> bool;
}

pub type BoxJob = Box<dyn Job>;

/// Entry payloads the dispatcher can skip once their caller is gone
pub trait Abandonable {
    fn is_abandoned(&self) -> bool;
}

impl Abandonable for BoxJob {
    fn is_abandoned(&self) -> bool {
        Job::is_abandoned(&**self)
    }
}

type Reply<T, E> = oneshot::Sender<Result<T, QueueError<E>>>;

pub(crate) struct TypedJob<F, T, E> {
    work: F,
    reply: Reply<T, E>,
    settle: SettleNotifier,
}

impl<F, T, E> TypedJob<F, T, E> {
    pub(crate) fn new(work: F, reply: Reply<T, E>, settle: SettleNotifier) -> Self {
        Self { work, reply, settle }
    }
}

impl<F, Fut, T, E> Job for TypedJob<F, T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn run(self: Box<Self>, ctx: ExecContext) -> BoxFuture<'static, ()> {
        let TypedJob { work, reply, settle } = *self;
        Box::pin(async move {
            let (outcome, result) = execute(work, ctx.timeout, ctx.abort_on_timeout).await;
            settle.notify(outcome).await;
            if reply.send(result).is_err() {
                debug!(%outcome, "TypedJob::run: caller gone, result discarded");
            }
        })
    }

    fn reject(self: Box<Self>, reason: Rejection) {
        let err = match reason {
            Rejection::Cancelled => QueueError::Cancelled,
            Rejection::Shutdown => QueueError::Shutdown,
        };
        let _ = self.reply.send(Err(err));
    }

    fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }
}

/// Run `work` as its own task and race it against `timeout`
///
/// Whichever settles first decides the result. A timed-out work task keeps
/// running unless `abort_on_timeout` is set. The closure itself is called
/// inside the task, so a panic while building the future is a `Panicked`
/// outcome like any other.
pub async fn execute<F, Fut, T, E>(work: F, timeout: Duration, abort_on_timeout: bool) -> (Outcome, Result<T, QueueError<E>>)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut task = tokio::spawn(async move { work().await });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(value))) => (Outcome::Resolved, Ok(value)),
        Ok(Ok(Err(e))) => (Outcome::Failed, Err(QueueError::Work(e))),
        Ok(Err(join_err)) => {
            let msg = panic_message(join_err);
            warn!(%msg, "execute: work panicked");
            (Outcome::Panicked, Err(QueueError::Panicked(msg)))
        }
        Err(_) => {
            if abort_on_timeout {
                warn!(?timeout, "execute: timed out, aborting work");
                task.abort();
            } else {
                warn!(?timeout, "execute: timed out, work left running in background");
            }
            (Outcome::TimedOut, Err(QueueError::Timeout(timeout)))
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
