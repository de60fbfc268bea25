//! curfewd - The dormitory curfew reconciliation service
//!
//! This is the main entry point for the curfewd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Reconciler
//! - Daily scheduler with retry

mod scheduler;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use clap::Parser;
use curfew_config::{CurfewPolicy, load_config};
use curfew_core::Reconciler;
use curfew_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use curfew_util::{
    DATABASE_FILENAME, default_config_path, format_duration, is_mock_time_active, now_in,
    parse_date,
};
use scheduler::{RunOutcome, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// curfewd - Nightly dormitory curfew reconciliation
#[derive(Parser, Debug)]
#[command(name = "curfewd")]
#[command(about = "Nightly dormitory curfew reconciliation", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/curfew/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set CURFEW_DATA_DIR env var)
    #[arg(short, long, env = "CURFEW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Reconcile a single date and exit instead of running daily
    #[arg(long)]
    once: bool,

    /// Business date to reconcile with --once (default: yesterday)
    #[arg(long, requires = "once", value_parser = parse_date_arg)]
    date: Option<NaiveDate>,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).ok_or_else(|| format!("invalid date '{}', expected YYYY-MM-DD", s))
}

/// Main service state
struct Service {
    policy: CurfewPolicy,
    scheduler: Scheduler,
    store: Arc<dyn Store>,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        // Load configuration; a missing file means all defaults
        let policy = if args.config.exists() {
            load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?
        } else {
            warn!(config_path = %args.config.display(), "Config file not found, using defaults");
            CurfewPolicy::default()
        };

        info!(
            config_path = %args.config.display(),
            curfew = %policy.rules.curfew,
            run_at = %policy.service.run_at,
            timezone = %policy.service.timezone,
            "Configuration loaded"
        );

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        // Initialize store
        let db_path = data_dir.join(DATABASE_FILENAME);
        let sqlite = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        let store: Arc<dyn Store> = sqlite.clone();

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let reconciler = Reconciler::from_store(sqlite, policy.rules);
        let scheduler = Scheduler::new(
            reconciler,
            store.clone(),
            policy.retry,
            policy.service.run_at,
        );

        Ok(Self {
            policy,
            scheduler,
            store,
        })
    }

    /// Reconcile one date and exit
    async fn run_once(self, date: Option<NaiveDate>) -> Result<()> {
        let date =
            date.unwrap_or_else(|| Scheduler::target_date(&now_in(self.policy.service.timezone)));

        let outcome = self.scheduler.reconcile_with_retry(date).await;
        self.shutdown();

        match outcome {
            RunOutcome::Committed(report) => {
                info!(
                    date = %report.date,
                    records = report.records.len(),
                    points = report.total_points(),
                    "Run complete"
                );
                Ok(())
            }
            RunOutcome::Skipped(reason) => {
                info!(date = %date, reason = %reason, "Run skipped");
                Ok(())
            }
            RunOutcome::Failed(err) => {
                Err(anyhow::Error::new(err).context(format!("Reconciliation for {} failed", date)))
            }
        }
    }

    /// Reconcile "yesterday" every day at `run_at` until signalled
    async fn run(self) -> Result<()> {
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        let timezone = self.policy.service.timezone;

        info!("Service running");

        let mut last_trigger: Option<DateTime<FixedOffset>> = None;

        loop {
            let now = now_in(timezone);
            let next = self.scheduler.following_run(&now, last_trigger);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            info!(
                next_run = %next,
                wait = %format_duration(wait),
                "Waiting for next run"
            );

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    let date = Scheduler::target_date(&next);
                    last_trigger = Some(next);
                    // Failures are audited; the next day's trigger still fires
                    let _ = self.scheduler.reconcile_with_retry(date).await;
                }
            }
        }

        self.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    fn shutdown(&self) {
        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to record service stop");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "curfewd starting");

    if is_mock_time_active() {
        warn!("Mock time is active; dates are computed from the shifted clock");
    }

    let service = Service::new(&args)?;
    if args.once {
        service.run_once(args.date).await
    } else {
        service.run().await
    }
}
