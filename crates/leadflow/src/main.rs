// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leadflow - lead distribution and cadence automation engine.
//!
//! This is the binary entry point: definition checks and imports, routing
//! previews, scheduler ticks, and redistribution history queries.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod audit;
mod definitions;
mod lead;
mod route;
mod shutdown;
mod tick;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use leadflow_config::LeadflowConfig;
use leadflow_core::LeadflowError;
use leadflow_core::model::OperationType;
use leadflow_engine::{Engine, LoggingCollaborators};
use tracing::info;

/// Leadflow - lead distribution and cadence automation engine.
#[derive(Parser, Debug)]
#[command(name = "leadflow", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a queue/cadence definitions file.
    Check {
        definitions: PathBuf,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Validate and store a queue/cadence definitions file.
    Import { definitions: PathBuf },
    /// Show where a lead record (JSON) would be routed.
    Route {
        record: PathBuf,
        /// Print every queue's rule verdicts.
        #[arg(long)]
        explain: bool,
        #[arg(long)]
        json: bool,
    },
    /// Deliver a lead event (JSON) to the engine.
    Event {
        event: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Reassign a lead to another broker.
    Redistribute {
        lead: String,
        /// Queue to assign from; defaults to the lead's current queue.
        #[arg(long)]
        queue: Option<String>,
        /// User responsible for the move.
        #[arg(long)]
        by: Option<String>,
        #[arg(long, default_value = "manual redistribution")]
        reason: String,
        #[arg(long)]
        operation: Option<OperationType>,
        /// Current lead record (JSON), read for audit dimensions.
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Advance due cadence instances.
    Tick {
        /// Instant to tick at (RFC 3339 or YYYY-MM-DD); defaults to now.
        #[arg(long, value_parser = parse_instant, conflicts_with = "watch")]
        now: Option<DateTime<Utc>>,
        /// Keep ticking on the configured interval until interrupted.
        #[arg(long)]
        watch: bool,
        #[arg(long)]
        json: bool,
    },
    /// Query the redistribution history.
    Audit(audit::AuditArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => leadflow_config::load_and_validate_path(path),
        None => leadflow_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            leadflow_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.engine.log_level);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(LeadflowError::Validation(errors)) => {
            eprintln!("error: invalid definitions");
            for error in errors {
                eprintln!("  - {error}");
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &LeadflowConfig) -> Result<(), LeadflowError> {
    // `check` never touches storage.
    if let Commands::Check { definitions, plain } = &command {
        return definitions::run_check(definitions, *plain);
    }

    let engine = build_engine(config).await?;
    match command {
        Commands::Check { .. } => Ok(()),
        Commands::Import { definitions } => definitions::run_import(&engine, &definitions).await,
        Commands::Route {
            record,
            explain,
            json,
        } => route::run_route(&engine, &record, Utc::now(), explain, json).await,
        Commands::Event { event, json } => lead::run_event(&engine, &event, json).await,
        Commands::Redistribute {
            lead,
            queue,
            by,
            reason,
            operation,
            record,
        } => {
            let options = lead::RedistributeOptions {
                queue: queue.as_deref(),
                by: by.as_deref(),
                reason: &reason,
                operation,
                record: record.as_deref(),
            };
            lead::run_redistribute(&engine, &lead, options).await
        }
        Commands::Tick { watch: true, .. } => {
            let interval = Duration::from_secs(config.scheduler.tick_interval_secs);
            tick::run_watch(&engine, interval).await
        }
        Commands::Tick { now, json, .. } => {
            tick::run_tick(&engine, now.unwrap_or_else(Utc::now), json).await
        }
        Commands::Audit(args) => {
            audit::run_audit(&engine, &args, config.audit.default_lookback_days).await
        }
    }
}

async fn build_engine(config: &LeadflowConfig) -> Result<Engine, LeadflowError> {
    leadflow_engine::metrics::register_metrics();
    let stores = leadflow_storage::open_storage(&config.storage).await?;
    let engine = Engine::from_config(config, stores, Arc::new(LoggingCollaborators));
    info!(name = %config.engine.name, "engine ready");
    Ok(engine)
}

/// Parse an RFC 3339 instant, or a bare date taken as midnight UTC.
pub(crate) fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 or YYYY-MM-DD, got {value:?}"))
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("leadflow={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
