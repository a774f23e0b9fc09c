//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::Priority;

/// RequestQueue - priority and rate-limit aware request queueing
#[derive(Parser)]
#[command(
    name = "rq",
    about = "Priority-ordered, rate-limited request queues for downstream services",
    version,
    after_help = "Logs are written to: ~/.local/share/requestqueue/logs/rq.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Print the effective configuration
    Config {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// List configured targets and their limits
    Targets {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Push synthetic work through a target's queue and report each outcome
    Simulate {
        /// Target identifier
        #[arg(short, long, default_value = "fast")]
        target: String,

        /// Number of requests to submit
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Priority of every request (name or integer)
        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        /// Base duration of each request's work
        #[arg(long, default_value = "50")]
        work_ms: u64,

        /// Random extra duration added to each request, up to this many ms
        #[arg(long, default_value = "0")]
        jitter_ms: u64,

        /// Make every Nth request fail
        #[arg(long)]
        fail_every: Option<usize>,

        /// Make every Nth request hang past the timeout
        #[arg(long)]
        hang_every: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for targets/simulate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

/// Output format for the config command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
}

impl std::str::FromStr for ConfigFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: yaml or json", s)),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("requestqueue")
        .join("logs")
        .join("rq.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::parse_from([
            "rq", "simulate", "--target", "slow", "-n", "5", "--priority", "high", "--fail-every", "2",
        ]);
        match cli.command {
            Command::Simulate {
                target,
                count,
                priority,
                fail_every,
                hang_every,
                format,
                ..
            } => {
                assert_eq!(target, "slow");
                assert_eq!(count, 5);
                assert_eq!(priority, Priority::HIGH);
                assert_eq!(fail_every, Some(2));
                assert_eq!(hang_every, None);
                assert_eq!(format, OutputFormat::Text);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("plain".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("table".parse::<OutputFormat>().is_err());
        assert_eq!("yml".parse::<ConfigFormat>().unwrap(), ConfigFormat::Yaml);
    }
}
