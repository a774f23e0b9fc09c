//! Queue error types

use std::time::Duration;
use thiserror::Error;

/// Ways an enqueued request can be rejected
///
/// `E` is the work's own error type and is passed through unchanged in
/// [`QueueError::Work`]. Rate-limit stalls never show up here; they only add
/// latency.
#[derive(Debug, Error)]
pub enum QueueError<E> {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Work failed: {0}")]
    Work(E),

    #[error("Work panicked: {0}")]
    Panicked(String),

    #[error("Cancelled before dispatch")]
    Cancelled,

    #[error("Queue shut down before dispatch")]
    Shutdown,

    #[error("Queue '{0}' is closed")]
    Closed(String),
}

impl<E> QueueError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueueError::Timeout(_))
    }

    /// The work's own failure, if that is why the request was rejected
    pub fn work_error(&self) -> Option<&E> {
        match self {
            QueueError::Work(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_work_error(self) -> Option<E> {
        match self {
            QueueError::Work(e) => Some(e),
            _ => None,
        }
    }

    /// Replace the work error type, keeping every queue-level variant
    pub fn map_work<F, E2>(self, f: F) -> QueueError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            QueueError::Timeout(d) => QueueError::Timeout(d),
            QueueError::Work(e) => QueueError::Work(f(e)),
            QueueError::Panicked(msg) => QueueError::Panicked(msg),
            QueueError::Cancelled => QueueError::Cancelled,
            QueueError::Shutdown => QueueError::Shutdown,
            QueueError::Closed(id) => QueueError::Closed(id),
        }
    }
}

/// Misconfiguration, rejected when a queue is constructed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max-concurrent must be greater than zero")]
    ZeroConcurrency,

    #[error("rate-limit-count must be greater than zero")]
    ZeroRateLimit,

    #[error("rate-window-ms must be greater than zero")]
    ZeroRateWindow,

    #[error("timeout-ms must be greater than zero")]
    ZeroTimeout,

    #[error("channel-buffer must be greater than zero")]
    ZeroChannelBuffer,

    #[error("Queue '{0}' is already running; its config cannot change")]
    AlreadyStarted(String),

    #[error("Queue '{identifier}': {source}")]
    Queue {
        identifier: String,
        #[source]
        source: Box<ConfigError>,
    },
}
