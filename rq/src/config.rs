//! RequestQueue configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::queue::{QueueConfig, QueueManager};

/// Main RequestQueue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Config for identifiers without their own entry in `targets`
    pub default: QueueConfig,

    /// Per-target queue configs, keyed by identifier
    pub targets: BTreeMap<String, QueueConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let mut targets = BTreeMap::new();
        targets.insert(
            "fast".to_string(),
            QueueConfig {
                max_concurrent: 10,
                rate_limit_count: 50,
                rate_window_ms: 1_000,
                timeout_ms: 30_000,
                ..Default::default()
            },
        );
        targets.insert(
            "slow".to_string(),
            QueueConfig {
                max_concurrent: 2,
                rate_limit_count: 5,
                rate_window_ms: 1_000,
                timeout_ms: 60_000,
                ..Default::default()
            },
        );

        Self {
            default: QueueConfig::default(),
            targets,
        }
    }
}

impl Config {
    /// Check every queue config before anything is spawned
    pub fn validate(&self) -> Result<()> {
        self.default.validate().context("Invalid default queue config")?;
        for (identifier, queue) in &self.targets {
            queue
                .validate()
                .with_context(|| format!("Invalid queue config for target '{}'", identifier))?;
        }
        Ok(())
    }

    /// Config a target runs with; falls back to `default`
    pub fn target(&self, identifier: &str) -> &QueueConfig {
        self.targets.get(identifier).unwrap_or(&self.default)
    }

    /// Build a manager with every configured target registered
    pub fn manager(&self) -> Result<QueueManager> {
        let manager = QueueManager::with_queues(
            self.default.clone(),
            self.targets.iter().map(|(id, queue)| (id.clone(), queue.clone())),
        )?;
        Ok(manager)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .requestqueue.yml
        let local_config = PathBuf::from(".requestqueue.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/requestqueue/requestqueue.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("requestqueue").join("requestqueue.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default, QueueConfig::default());
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.target("slow").max_concurrent, 2);
        assert_eq!(config.target("unknown"), &config.default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
default:
  max-concurrent: 4
targets:
  anthropic:
    max-concurrent: 3
    rate-limit-count: 40
    rate-window-ms: 60000
    timeout-ms: 120000
    abort-on-timeout: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.default.max_concurrent, 4);
        assert_eq!(config.default.rate_limit_count, 50);

        let anthropic = config.target("anthropic");
        assert_eq!(anthropic.max_concurrent, 3);
        assert_eq!(anthropic.rate_limit_count, 40);
        assert!(anthropic.abort_on_timeout);
        assert_eq!(anthropic.channel_buffer, 1000);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "targets:\n  search:\n    max-concurrent: 1\n    rate-limit-count: 2").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.target("search").rate_limit_count, 2);
    }

    #[test]
    fn test_load_rejects_zero_limits() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "targets:\n  broken:\n    max-concurrent: 0").unwrap();

        let err = Config::load(Some(&file.path().to_path_buf())).unwrap_err();
        assert!(
            err.chain()
                .any(|cause| cause.to_string() == "max-concurrent must be greater than zero")
        );
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/requestqueue.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[tokio::test]
    async fn test_manager_registers_targets() {
        let manager = Config::default().manager().unwrap();
        assert_eq!(manager.identifiers().await, vec!["fast".to_string(), "slow".to_string()]);
        assert_eq!(manager.config_for("slow").await.max_concurrent, 2);
    }
}
