//! Request queue for rate-limited downstream services
//!
//! Every call into a downstream target goes through a queue instance that
//! enforces three things:
//! - **Concurrency:** at most `max-concurrent` calls in flight
//! - **Rate:** at most `rate-limit-count` dispatches per fixed window
//! - **Order:** higher priority first, FIFO among equal priorities
//!
//! Each instance runs as its own task and is the only writer of its state.
//! Callers talk to it through a [`QueueHandle`] or the [`QueueManager`]
//! registry, and get results back through a [`Ticket`].

mod config;
mod dispatcher;
mod error;
mod executor;
mod handle;
mod instance;
mod limiter;
mod manager;
mod messages;
mod store;

pub use config::QueueConfig;
pub use dispatcher::{DispatchPass, Dispatcher};
pub use error::{ConfigError, QueueError};
pub use executor::{Abandonable, Outcome, execute};
pub use handle::{QueueHandle, Ticket};
pub use instance::QueueInstance;
pub use limiter::{RateLimiter, RateWindow};
pub use manager::QueueManager;
pub use messages::{EntrySnapshot, EntryStatus, QueueStats, QueueStatus};
pub use store::{EntryId, WaitingEntry, WaitingStore};
