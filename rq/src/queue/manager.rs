//! QueueManager - registry of per-identifier queue instances
//!
//! Each identifier (one per downstream target) gets its own instance with its
//! own configuration, waiting store, rate window and processing set.
//! Saturating one identifier never delays another.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use eyre::Result;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::domain::Priority;

use super::config::QueueConfig;
use super::error::{ConfigError, QueueError};
use super::handle::{QueueHandle, Ticket};
use super::instance::QueueInstance;
use super::messages::{EntrySnapshot, QueueStatus};
use super::store::EntryId;

#[derive(Default)]
struct Registry {
    configs: HashMap<String, QueueConfig>,
    queues: HashMap<String, QueueHandle>,
    closed: bool,
}

/// Registry of queue instances keyed by identifier
///
/// Instances are spawned lazily on first use, so a manager can be built
/// outside a runtime. Identifiers without explicit configuration use the
/// manager's default config.
pub struct QueueManager {
    default_config: QueueConfig,
    registry: Mutex<Registry>,
}

impl QueueManager {
    /// Create a manager with a default config for unconfigured identifiers
    pub fn new(default_config: QueueConfig) -> Result<Self, ConfigError> {
        Self::with_queues(default_config, Vec::<(String, QueueConfig)>::new())
    }

    /// Create a manager with explicit per-identifier configs
    pub fn with_queues<I, S>(default_config: QueueConfig, queues: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, QueueConfig)>,
        S: Into<String>,
    {
        validate_for("default", &default_config)?;

        let mut registry = Registry::default();
        for (identifier, config) in queues {
            let identifier = identifier.into();
            validate_for(&identifier, &config)?;
            registry.configs.insert(identifier, config);
        }
        debug!(?default_config, configured = registry.configs.len(), "QueueManager::with_queues: called");

        Ok(Self {
            default_config,
            registry: Mutex::new(registry),
        })
    }

    pub fn default_config(&self) -> &QueueConfig {
        &self.default_config
    }

    /// Register the config for an identifier before its instance starts
    pub async fn configure(&self, identifier: impl Into<String>, config: QueueConfig) -> Result<(), ConfigError> {
        let identifier = identifier.into();
        debug!(%identifier, ?config, "QueueManager::configure: called");
        validate_for(&identifier, &config)?;

        let mut registry = self.registry.lock().await;
        if registry.queues.get(&identifier).is_some_and(|h| !h.is_closed()) {
            return Err(ConfigError::AlreadyStarted(identifier));
        }
        registry.configs.insert(identifier, config);
        Ok(())
    }

    /// The config an identifier runs (or will run) with
    pub async fn config_for(&self, identifier: &str) -> QueueConfig {
        let registry = self.registry.lock().await;
        registry
            .configs
            .get(identifier)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    /// Get the handle for an identifier, starting its instance on first use
    ///
    /// An instance stopped directly through [`QueueHandle::shutdown`] is
    /// started again. Returns None once the manager has been shut down.
    pub async fn queue(&self, identifier: &str) -> Option<QueueHandle> {
        let mut registry = self.registry.lock().await;
        if registry.closed {
            return None;
        }
        match registry.queues.get(identifier) {
            Some(handle) if !handle.is_closed() => return Some(handle.clone()),
            Some(_) => {
                info!(%identifier, "Queue instance was stopped, restarting");
                registry.queues.remove(identifier);
            }
            None => {}
        }

        let config = registry
            .configs
            .get(identifier)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());

        match QueueInstance::spawn(identifier, config) {
            Ok(handle) => {
                info!(%identifier, "Started queue instance");
                registry.queues.insert(identifier.to_string(), handle.clone());
                Some(handle)
            }
            Err(e) => {
                // Configs are validated on registration
                error!(%identifier, error = %e, "Failed to start queue instance");
                None
            }
        }
    }

    /// Submit work to an identifier's queue and get a ticket for the result
    pub async fn submit<F, Fut, T, E>(
        &self,
        identifier: &str,
        priority: Priority,
        work: F,
    ) -> Result<Ticket<T, E>, QueueError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let handle = self
            .queue(identifier)
            .await
            .ok_or_else(|| QueueError::Closed(identifier.to_string()))?;
        handle.submit(priority, work).await
    }

    /// Submit work to an identifier's queue and wait for it to settle
    pub async fn enqueue<F, Fut, T, E>(&self, identifier: &str, priority: Priority, work: F) -> Result<T, QueueError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit(identifier, priority, work).await?.await
    }

    /// Cancel a still-waiting entry
    pub async fn cancel(&self, identifier: &str, id: EntryId) -> Result<bool> {
        match self.started(identifier).await {
            Some(handle) => handle.cancel(id).await,
            None => Ok(false),
        }
    }

    /// Snapshot of one identifier; all zeros if it has never been used
    pub async fn status(&self, identifier: &str) -> Result<QueueStatus> {
        match self.started(identifier).await {
            Some(handle) => handle.status().await,
            None => Ok(QueueStatus::idle(identifier)),
        }
    }

    /// Snapshots of every configured or started identifier, sorted by name
    pub async fn statuses(&self) -> Result<Vec<QueueStatus>> {
        let (configured, started) = {
            let registry = self.registry.lock().await;
            let configured: Vec<String> = registry.configs.keys().cloned().collect();
            let started: BTreeMap<String, QueueHandle> =
                registry.queues.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            (configured, started)
        };

        let mut statuses = BTreeMap::new();
        for identifier in configured {
            statuses.insert(identifier.clone(), QueueStatus::idle(identifier));
        }
        for (identifier, handle) in started {
            if !handle.is_closed() {
                statuses.insert(identifier, handle.status().await?);
            }
        }
        Ok(statuses.into_values().collect())
    }

    /// Processing and waiting entries of one identifier
    pub async fn details(&self, identifier: &str) -> Result<Vec<EntrySnapshot>> {
        match self.started(identifier).await {
            Some(handle) => handle.details().await,
            None => Ok(Vec::new()),
        }
    }

    /// Identifiers that are configured or have a running instance
    pub async fn identifiers(&self) -> Vec<String> {
        let registry = self.registry.lock().await;
        let mut ids: Vec<String> = registry.configs.keys().chain(registry.queues.keys()).cloned().collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Shut down every instance; later submissions fail with [`QueueError::Closed`]
    pub async fn shutdown(&self) -> Result<()> {
        let handles: Vec<QueueHandle> = {
            let mut registry = self.registry.lock().await;
            registry.closed = true;
            registry.queues.drain().map(|(_, h)| h).filter(|h| !h.is_closed()).collect()
        };
        info!(count = handles.len(), "Shutting down queue instances");
        for handle in handles {
            handle.shutdown().await?;
        }
        Ok(())
    }

    async fn started(&self, identifier: &str) -> Option<QueueHandle> {
        self.registry
            .lock()
            .await
            .queues
            .get(identifier)
            .filter(|h| !h.is_closed())
            .cloned()
    }
}

fn validate_for(identifier: &str, config: &QueueConfig) -> Result<(), ConfigError> {
    config.validate().map_err(|e| ConfigError::Queue {
        identifier: identifier.to_string(),
        source: Box::new(e),
    })
}
