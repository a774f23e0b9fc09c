//! QueueHandle - client interface to one queue instance

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::domain::Priority;

use super::error::QueueError;
use super::executor::{SettleNotifier, TypedJob};
use super::messages::{EntrySnapshot, QueueRequest, QueueStatus};
use super::store::EntryId;

/// Handle for submitting work to one queue instance
///
/// Cloneable; every clone talks to the same instance task.
#[derive(Clone)]
pub struct QueueHandle {
    identifier: String,
    tx: mpsc::Sender<QueueRequest>,
    next_id: Arc<AtomicU64>,
}

impl QueueHandle {
    pub(crate) fn new(identifier: String, tx: mpsc::Sender<QueueRequest>, next_id: Arc<AtomicU64>) -> Self {
        Self { identifier, tx, next_id }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The instance task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Submit work and get a ticket that settles with its result
    ///
    /// The work does not start until the instance dispatches it. Dropping the
    /// ticket before dispatch abandons the entry; it is skipped without
    /// consuming rate budget.
    pub async fn submit<F, Fut, T, E>(&self, priority: Priority, work: F) -> Result<Ticket<T, E>, QueueError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(identifier = %self.identifier, %id, %priority, "QueueHandle::submit: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        let settle = SettleNotifier::new(id, self.tx.clone());

        self.tx
            .send(QueueRequest::Enqueue {
                id,
                priority,
                job: Box::new(TypedJob::new(work, reply_tx, settle)),
            })
            .await
            .map_err(|_| QueueError::Closed(self.identifier.clone()))?;

        Ok(Ticket {
            id,
            identifier: self.identifier.clone(),
            rx: reply_rx,
        })
    }

    /// Submit work and wait for it to settle
    pub async fn enqueue<F, Fut, T, E>(&self, priority: Priority, work: F) -> Result<T, QueueError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit(priority, work).await?.await
    }

    /// Reject a still-waiting entry with [`QueueError::Cancelled`]
    ///
    /// Returns false if the entry was already dispatched, settled, or never existed.
    pub async fn cancel(&self, id: EntryId) -> Result<bool> {
        debug!(identifier = %self.identifier, %id, "QueueHandle::cancel: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueRequest::Cancel { id, reply_tx })
            .await
            .map_err(|_| eyre!("Queue '{}' channel closed", self.identifier))?;
        reply_rx
            .await
            .map_err(|_| eyre!("Queue '{}' stopped before reply", self.identifier))
    }

    /// Point-in-time queued/processing counts
    pub async fn status(&self) -> Result<QueueStatus> {
        debug!(identifier = %self.identifier, "QueueHandle::status: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueRequest::GetStatus { reply_tx })
            .await
            .map_err(|_| eyre!("Queue '{}' channel closed", self.identifier))?;
        reply_rx
            .await
            .map_err(|_| eyre!("Queue '{}' stopped before reply", self.identifier))
    }

    /// Every processing and waiting entry
    pub async fn details(&self) -> Result<Vec<EntrySnapshot>> {
        debug!(identifier = %self.identifier, "QueueHandle::details: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueRequest::GetDetails { reply_tx })
            .await
            .map_err(|_| eyre!("Queue '{}' channel closed", self.identifier))?;
        reply_rx
            .await
            .map_err(|_| eyre!("Queue '{}' stopped before reply", self.identifier))
    }

    /// Reject every waiting entry and stop the instance
    ///
    /// Work already processing keeps running and still settles its callers.
    pub async fn shutdown(&self) -> Result<()> {
        debug!(identifier = %self.identifier, "QueueHandle::shutdown: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueRequest::Shutdown { reply_tx })
            .await
            .map_err(|_| eyre!("Queue '{}' channel closed", self.identifier))?;
        reply_rx
            .await
            .map_err(|_| eyre!("Queue '{}' stopped before acknowledging shutdown", self.identifier))
    }
}

/// Pending result of a submitted entry
///
/// Resolves exactly once. If the instance goes away without settling the
/// entry, it resolves to [`QueueError::Closed`].
#[must_use = "dropping a ticket before dispatch abandons the entry"]
pub struct Ticket<T, E> {
    id: EntryId,
    identifier: String,
    rx: oneshot::Receiver<Result<T, QueueError<E>>>,
}

impl<T, E> Ticket<T, E> {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl<T, E> Future for Ticket<T, E> {
    type Output = Result<T, QueueError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::Closed(this.identifier.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}
