// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadflow route` command implementation.
//!
//! Shows which queue and broker a lead record would be routed to without
//! touching rotation state. `--explain` prints every queue's rule verdicts.

use std::io::IsTerminal;
use std::path::Path;

use chrono::{DateTime, Utc};
use leadflow_core::model::Queue;
use leadflow_core::{LeadRecord, LeadflowError};
use leadflow_engine::Engine;
use leadflow_rules::RuleOutcome;
use serde::Serialize;

/// Rule verdicts of one queue, for `--explain`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueExplanation {
    pub queue_id: String,
    pub position: u32,
    pub matched: bool,
    pub rules: Vec<RuleOutcome>,
}

pub fn read_record(path: &Path) -> Result<LeadRecord, LeadflowError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LeadflowError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| LeadflowError::Config(format!("invalid lead record: {e}")))
}

/// Per-queue rule diagnostics in evaluation order.
pub fn explain(engine: &Engine, record: &LeadRecord, queues: &[Queue]) -> Vec<QueueExplanation> {
    let mut ordered: Vec<&Queue> = queues.iter().collect();
    ordered.sort_by_key(|q| q.position);
    ordered
        .into_iter()
        .map(|queue| {
            let rules = engine.rules().explain(record, &queue.rules);
            QueueExplanation {
                queue_id: queue.id.to_string(),
                position: queue.position,
                matched: rules.iter().all(|r| r.verdict.is_match()),
                rules,
            }
        })
        .collect()
}

/// Run the `leadflow route` command.
pub async fn run_route(
    engine: &Engine,
    path: &Path,
    now: DateTime<Utc>,
    show_explain: bool,
    json: bool,
) -> Result<(), LeadflowError> {
    let record = read_record(path)?;
    let preview = engine.preview_route(&record, now).await?;
    let explanation = if show_explain {
        let queues = engine.stores().queues.list_queues().await?;
        explain(engine, &record, &queues)
    } else {
        Vec::new()
    };

    if json {
        let output = serde_json::json!({ "route": preview, "queues": explanation });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(());
    }

    let use_color = std::io::stdout().is_terminal();
    for queue in &explanation {
        println!("queue {} (position {})", queue.queue_id, queue.position);
        for outcome in &queue.rules {
            let verdict = format!("{:?}", outcome.verdict);
            let verdict = if use_color {
                use colored::Colorize;
                if outcome.verdict.is_match() {
                    verdict.green().to_string()
                } else {
                    verdict.red().to_string()
                }
            } else {
                verdict
            };
            let actual = outcome
                .actual
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {} (actual {actual}): {verdict}", outcome.rule);
        }
    }

    match (&preview.queue_id, &preview.agent_id) {
        (Some(queue), Some(agent)) => println!("route: queue {queue}, broker {agent}"),
        (Some(queue), None) => println!("route: queue {queue}, no eligible broker"),
        _ => println!("route: no queue matched"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use leadflow_core::Stores;
    use leadflow_core::model::{Rule, RuleOperator};
    use leadflow_engine::LoggingCollaborators;
    use leadflow_storage::MemoryStorage;

    use super::*;

    fn engine() -> Engine {
        Engine::new(
            Stores::new(Arc::new(MemoryStorage::new())),
            Arc::new(LoggingCollaborators),
        )
    }

    #[test]
    fn explains_queues_in_position_order() {
        let mut late = Queue::new("portal", "Portal")
            .with_rule(Rule::new("origem", RuleOperator::Equals, "Portal"));
        late.position = 5;
        let mut early = Queue::new("site", "Site")
            .with_rule(Rule::new("origem", RuleOperator::Equals, "Site"))
            .with_rule(Rule::new("valor", RuleOperator::GreaterThan, 100000.0));
        early.position = 1;

        let record = LeadRecord::new().with("origem", "Site").with("valor", 50000);
        let explanation = explain(&engine(), &record, &[late, early]);

        assert_eq!(explanation[0].queue_id, "site");
        assert!(!explanation[0].matched);
        assert!(explanation[0].rules[0].verdict.is_match());
        assert!(!explanation[0].rules[1].verdict.is_match());
        assert_eq!(explanation[1].queue_id, "portal");
    }

    #[test]
    fn reads_record_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lead.json");
        std::fs::write(&path, r#"{"origem": "Site", "valor": 450000}"#).unwrap();
        let record = read_record(&path).unwrap();
        assert_eq!(record.text("origem"), Some("Site"));
    }
}
