//! Per-queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigError;

/// Configuration of one queue instance
///
/// Immutable once the instance is constructed. Construction goes through
/// [`QueueConfig::validate`], so a running instance never sees zero limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Max requests executing at once
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Max admissions per rate window
    #[serde(rename = "rate-limit-count")]
    pub rate_limit_count: u32,

    /// Rate window duration in milliseconds
    #[serde(rename = "rate-window-ms")]
    pub rate_window_ms: u64,

    /// Execution timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Abort the work task when it times out instead of letting it finish in the background
    #[serde(rename = "abort-on-timeout")]
    pub abort_on_timeout: bool,

    /// Buffer size of the instance's request channel
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            rate_limit_count: 50,
            rate_window_ms: 60_000,
            timeout_ms: 300_000,
            abort_on_timeout: false,
            channel_buffer: 1000,
        }
    }
}

impl QueueConfig {
    pub fn new(max_concurrent: usize, rate_limit_count: u32, rate_window: Duration, timeout: Duration) -> Self {
        Self {
            max_concurrent,
            rate_limit_count,
            rate_window_ms: rate_window.as_millis() as u64,
            timeout_ms: timeout.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Get the rate window as a Duration
    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    /// Get the execution timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject configurations a queue cannot make progress under
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.rate_limit_count == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }
        if self.rate_window_ms == 0 {
            return Err(ConfigError::ZeroRateWindow);
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.channel_buffer == 0 {
            return Err(ConfigError::ZeroChannelBuffer);
        }
        Ok(())
    }
}
