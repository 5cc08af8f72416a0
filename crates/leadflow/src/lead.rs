// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadflow event` and `leadflow redistribute` command implementations.

use std::path::Path;

use chrono::Utc;
use leadflow_core::model::OperationType;
use leadflow_core::{LeadEvent, LeadflowError};
use leadflow_engine::{Distribution, Engine, EventReport, RedistributionRequest};

use crate::route::read_record;

pub fn read_event(path: &Path) -> Result<LeadEvent, LeadflowError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LeadflowError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| LeadflowError::Config(format!("invalid lead event: {e}")))
}

/// Run the `leadflow event` command: deliver one lead event to the engine.
pub async fn run_event(engine: &Engine, path: &Path, json: bool) -> Result<(), LeadflowError> {
    let event = read_event(path)?;
    let report = engine.handle_event(&event).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print_event_report(&report);
    }
    Ok(())
}

fn print_event_report(report: &EventReport) {
    println!("lead {}", report.lead_id);
    match &report.distribution {
        Distribution::NotRequired => {}
        Distribution::Unrouted => println!("  no queue matched, lead left unassigned"),
        Distribution::NoEligibleAgent { queue_id } => {
            println!("  queue {queue_id} has no eligible broker")
        }
        Distribution::Assigned {
            queue_id,
            agent_id,
            overflowed_from,
        } => match overflowed_from {
            Some(origin) => println!("  assigned to {agent_id} in {queue_id} (overflow from {origin})"),
            None => println!("  assigned to {agent_id} in {queue_id}"),
        },
    }
    for instance in &report.started {
        println!("  cadence instance {instance} started");
    }
    for cadence in &report.skipped {
        println!("  cadence {cadence} already open");
    }
    for message in &report.dispatch.errors {
        println!("  dispatch error: {message}");
    }
}

/// Options of `leadflow redistribute`.
#[derive(Debug, Default)]
pub struct RedistributeOptions<'a> {
    pub queue: Option<&'a str>,
    pub by: Option<&'a str>,
    pub reason: &'a str,
    pub operation: Option<OperationType>,
    pub record: Option<&'a Path>,
}

/// Run the `leadflow redistribute` command.
pub async fn run_redistribute(
    engine: &Engine,
    lead_id: &str,
    options: RedistributeOptions<'_>,
) -> Result<(), LeadflowError> {
    let mut request = RedistributionRequest::new(lead_id, options.reason);
    if let Some(queue) = options.queue {
        request = request.to_queue(queue);
    }
    if let Some(user) = options.by {
        request = request.by_user(user);
    }
    if let Some(operation) = options.operation {
        request = request.operation(operation);
    }
    if let Some(path) = options.record {
        request = request.with_record(read_record(path)?);
    }

    let report = engine.redistribute(request, Utc::now()).await?;
    let previous = report
        .previous_agent_id
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "lead {lead_id}: {previous} -> {} in {} ({} open cadence(s) updated)",
        report.agent_id,
        report.queue_id,
        report.updated_instances.len()
    );
    for message in &report.dispatch.errors {
        println!("  dispatch error: {message}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use leadflow_core::LeadEventKind;

    use super::*;

    #[test]
    fn reads_created_event() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(
            &path,
            r#"{
                "leadId": "l1",
                "kind": {"type": "created"},
                "record": {"origem": "Site"},
                "occurredAt": "2026-03-02T12:00:00Z"
            }"#,
        )
        .unwrap();
        let event = read_event(&path).unwrap();
        assert_eq!(event.lead_id.as_str(), "l1");
        assert_eq!(event.kind, LeadEventKind::Created);
        assert_eq!(event.record.text("origem"), Some("Site"));
    }
}
