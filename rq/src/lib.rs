//! RequestQueue - admission control for calls into rate-limited services
//!
//! Callers submit async work with a priority to a named queue. Each queue
//! bounds how many calls run at once and how many start per time window,
//! dispatches higher priority first, and applies a timeout to every call.
//!
//! ```ignore
//! let manager = QueueManager::new(QueueConfig::default())?;
//! let body = manager
//!     .enqueue("anthropic", Priority::HIGH, || async { client.complete(req).await })
//!     .await?;
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod queue;

pub use config::Config;
pub use domain::Priority;
pub use queue::{
    ConfigError, EntryId, EntrySnapshot, EntryStatus, QueueConfig, QueueError, QueueHandle, QueueInstance, QueueManager,
    QueueStats, QueueStatus, Ticket,
};
