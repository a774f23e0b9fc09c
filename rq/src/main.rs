//! RequestQueue - priority and rate-limit aware request queueing
//!
//! CLI entry point for inspecting configuration and exercising queues.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use requestqueue::cli::{Cli, Command, ConfigFormat, OutputFormat};
use requestqueue::config::Config;
use requestqueue::domain::Priority;
use requestqueue::queue::{Outcome, QueueError, QueueStatus};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("requestqueue")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("rq.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("RequestQueue loaded config: {} targets", config.targets.len());

    match cli.command {
        Command::Config { format } => cmd_config(&config, format),
        Command::Targets { format } => cmd_targets(&config, format),
        Command::Simulate {
            target,
            count,
            priority,
            work_ms,
            jitter_ms,
            fail_every,
            hang_every,
            format,
        } => {
            let plan = SimulationPlan {
                count,
                priority,
                work_ms,
                jitter_ms,
                fail_every,
                hang_every,
            };
            cmd_simulate(&config, &target, plan, format).await
        }
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config, format: ConfigFormat) -> Result<()> {
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config).context("Failed to render config as YAML")?,
        ConfigFormat::Json => serde_json::to_string_pretty(config).context("Failed to render config as JSON")?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

/// List configured targets and their limits
fn cmd_targets(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config.targets)?);
        }
        OutputFormat::Text => {
            if config.targets.is_empty() {
                println!("No targets configured; every identifier uses the default queue config");
                return Ok(());
            }
            println!(
                "{:<16} {:>10} {:>12} {:>10}",
                "TARGET", "CONCURRENT", "RATE", "TIMEOUT"
            );
            for (identifier, queue) in &config.targets {
                println!(
                    "{:<16} {:>10} {:>12} {:>10}",
                    identifier.bold(),
                    queue.max_concurrent,
                    format!("{}/{}ms", queue.rate_limit_count, queue.rate_window_ms),
                    format!("{}ms", queue.timeout_ms),
                );
            }
        }
    }
    Ok(())
}

/// Synthetic workload for the simulate command
struct SimulationPlan {
    count: usize,
    priority: Priority,
    work_ms: u64,
    jitter_ms: u64,
    fail_every: Option<usize>,
    hang_every: Option<usize>,
}

impl SimulationPlan {
    fn every(n: Option<usize>, index: usize) -> bool {
        matches!(n, Some(n) if n > 0 && index % n == 0)
    }

    fn fails(&self, index: usize) -> bool {
        Self::every(self.fail_every, index)
    }

    fn hangs(&self, index: usize) -> bool {
        Self::every(self.hang_every, index)
    }

    /// How long request `index` sleeps; hanging requests outlast `timeout`
    fn work_duration(&self, index: usize, jitter_ms: u64, timeout: Duration) -> Duration {
        if self.hangs(index) {
            timeout.saturating_add(Duration::from_millis(self.work_ms))
        } else {
            Duration::from_millis(self.work_ms.saturating_add(jitter_ms))
        }
    }
}

/// How one simulated request ended
#[derive(Debug, Serialize)]
struct SimulatedResult {
    index: usize,
    id: u64,
    outcome: String,
    #[serde(rename = "elapsed-ms")]
    elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    target: String,
    results: Vec<SimulatedResult>,
    status: QueueStatus,
}

/// Push synthetic work through a target's queue
async fn cmd_simulate(config: &Config, target: &str, plan: SimulationPlan, format: OutputFormat) -> Result<()> {
    let manager = config.manager()?;
    let queue_config = config.target(target).clone();
    let timeout = queue_config.timeout();
    info!(%target, count = plan.count, priority = %plan.priority, "Starting simulation");

    let jitters: Vec<u64> = {
        let mut rng = rand::rng();
        (0..plan.count).map(|_| rng.random_range(0..=plan.jitter_ms)).collect()
    };

    let started = Instant::now();
    let mut pending = Vec::with_capacity(plan.count);

    for (index, jitter) in (1..=plan.count).zip(jitters) {
        let work = plan.work_duration(index, jitter, timeout);
        let fails = plan.fails(index);

        let ticket = manager
            .submit(target, plan.priority, move || async move {
                tokio::time::sleep(work).await;
                if fails {
                    Err(format!("simulated failure on request {}", index))
                } else {
                    Ok(work.as_millis() as u64)
                }
            })
            .await
            .map_err(|e| eyre::eyre!("Failed to submit request {}: {}", index, e))?;

        let id = ticket.id();
        pending.push(async move {
            let result = ticket.await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let (outcome, error) = match result {
                Ok(_) => (Outcome::Resolved.to_string(), None),
                Err(e) => (outcome_label(&e), Some(e.to_string())),
            };
            SimulatedResult {
                index,
                id: id.0,
                outcome,
                elapsed_ms,
                error,
            }
        });
    }

    let results = join_all(pending).await;
    let status = manager.status(target).await?;
    manager.shutdown().await?;

    let report = SimulationReport {
        target: target.to_string(),
        results,
        status,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn outcome_label(err: &QueueError<String>) -> String {
    match err {
        QueueError::Timeout(_) => Outcome::TimedOut.to_string(),
        QueueError::Work(_) => Outcome::Failed.to_string(),
        QueueError::Panicked(_) => Outcome::Panicked.to_string(),
        QueueError::Cancelled => "cancelled".to_string(),
        QueueError::Shutdown => "shutdown".to_string(),
        QueueError::Closed(_) => "closed".to_string(),
    }
}

fn print_report(report: &SimulationReport) {
    println!("Simulation against '{}'", report.target.bold());
    for result in &report.results {
        let label = match result.outcome.as_str() {
            "resolved" => result.outcome.green(),
            "failed" => result.outcome.red(),
            "timed-out" => result.outcome.yellow(),
            _ => result.outcome.magenta(),
        };
        println!(
            "  {:>4}  #{:<5} {:<10} {:>7}ms",
            result.index, result.id, label, result.elapsed_ms
        );
    }

    let status = &report.status;
    let stats = &status.stats;
    println!();
    println!(
        "Status: {} queued, {} processing, {} total{}",
        status.queued,
        status.processing,
        status.total,
        if status.rate_limited { " (rate limited)".yellow().to_string() } else { String::new() }
    );
    println!(
        "Totals: {} dispatched, {} resolved, {} failed, {} timed out, {} rate-limit stalls",
        stats.total_dispatched, stats.total_resolved, stats.total_failed, stats.total_timed_out, stats.total_rate_limited
    );
    if let Some(avg) = stats.avg_wait_ms() {
        println!("Average wait: {}ms (peak concurrency {})", avg, stats.peak_concurrent);
    }
}
