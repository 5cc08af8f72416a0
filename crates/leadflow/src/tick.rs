// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadflow tick` command implementation.
//!
//! Runs one scheduler pass at a given instant, or with `--watch` keeps
//! ticking on the configured interval until SIGINT/SIGTERM.

use std::time::Duration;

use chrono::{DateTime, Utc};
use leadflow_core::LeadflowError;
use leadflow_engine::{Engine, TickReport};
use tracing::{error, info, warn};

use crate::shutdown;

/// Run a single tick and print its report.
pub async fn run_tick(engine: &Engine, now: DateTime<Utc>, json: bool) -> Result<(), LeadflowError> {
    let report = engine.tick(now).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Tick every `interval` until a shutdown signal arrives.
///
/// A failed pass is logged and the loop keeps going; only the signal stops it.
pub async fn run_watch(engine: &Engine, interval: Duration) -> Result<(), LeadflowError> {
    let cancel = shutdown::install_signal_handler();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "scheduler loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match engine.tick(Utc::now()).await {
                    Ok(report) if !report.is_clean() => {
                        warn!(
                            failures = report.failures.len(),
                            dispatch_errors = report.dispatch_errors.len(),
                            "tick completed with errors"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "tick failed"),
                }
            }
        }
    }

    info!("scheduler loop stopped");
    Ok(())
}

fn print_report(report: &TickReport) {
    println!("tick at {}", report.at.to_rfc3339());
    println!("  examined:   {}", report.examined);
    println!("  advanced:   {}", report.advanced);
    println!("  reassigned: {}", report.reassigned);
    println!("  dispatched: {}", report.dispatched);
    for message in &report.dispatch_errors {
        println!("  dispatch error: {message}");
    }
    for failure in &report.failures {
        println!("  instance {} failed: {}", failure.instance_id, failure.error);
    }
}
