// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadflow audit` command implementation.
//!
//! Queries the redistribution history with the same dimension filters the
//! reporting screens use, or groups it by one dimension with `--group-by`.

use std::io::IsTerminal;

use chrono::{DateTime, Duration, Utc};
use clap::Args;
use leadflow_core::LeadflowError;
use leadflow_core::model::{AuditDimension, AuditFilter, OperationType, RedistributionHistoryItem};
use leadflow_engine::Engine;

/// Filters accepted by `leadflow audit`.
#[derive(Args, Debug, Default)]
pub struct AuditArgs {
    /// Broker who received the lead (repeatable).
    #[arg(long = "broker")]
    pub brokers: Vec<String>,
    /// Pipeline stage at the time of the move (repeatable).
    #[arg(long = "stage")]
    pub stages: Vec<String>,
    /// Queue the lead was moved to (repeatable).
    #[arg(long = "queue")]
    pub queues: Vec<String>,
    /// Operation type, e.g. `escalation` (repeatable).
    #[arg(long = "operation")]
    pub operations: Vec<OperationType>,
    /// Free-text search over lead id, name, email, and phone.
    #[arg(long)]
    pub lead: Option<String>,
    /// Start of the window (RFC 3339 or YYYY-MM-DD).
    #[arg(long, value_parser = crate::parse_instant)]
    pub from: Option<DateTime<Utc>>,
    /// End of the window (RFC 3339 or YYYY-MM-DD).
    #[arg(long, value_parser = crate::parse_instant)]
    pub to: Option<DateTime<Utc>>,
    /// Group matching items by a dimension instead of listing them.
    #[arg(long = "group-by")]
    pub group_by: Option<AuditDimension>,
    /// Output JSON.
    #[arg(long)]
    pub json: bool,
}

impl AuditArgs {
    /// Build the query. Without `--from`, the window starts
    /// `lookback_days` before `now`.
    pub fn to_filter(&self, now: DateTime<Utc>, lookback_days: u32) -> AuditFilter {
        let mut filter = AuditFilter::new();
        for broker in &self.brokers {
            filter = filter.broker(broker.as_str());
        }
        for stage in &self.stages {
            filter = filter.stage(stage.as_str());
        }
        for operation in &self.operations {
            filter = filter.operation(*operation);
        }
        filter.target_queues = self.queues.iter().map(|q| q.as_str().into()).collect();
        filter.lead_search = self.lead.iter().cloned().collect();
        filter.from = Some(
            self.from
                .unwrap_or_else(|| now - Duration::days(i64::from(lookback_days))),
        );
        filter.to = self.to;
        filter
    }
}

/// Run the `leadflow audit` command.
pub async fn run_audit(
    engine: &Engine,
    args: &AuditArgs,
    lookback_days: u32,
) -> Result<(), LeadflowError> {
    let filter = args.to_filter(Utc::now(), lookback_days);

    if let Some(dimension) = args.group_by {
        let rows = engine.audit().summarize(&filter, dimension).await?;
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        } else {
            println!("{dimension}");
            for row in &rows {
                println!("  {:<24} {}", row.value, row.count);
            }
        }
        return Ok(());
    }

    let items = engine.audit().query(&filter).await?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }

    let use_color = std::io::stdout().is_terminal();
    if items.is_empty() {
        println!("no redistribution records match");
    }
    for item in &items {
        println!("{}", format_item(item, use_color));
    }
    Ok(())
}

fn format_item(item: &RedistributionHistoryItem, use_color: bool) -> String {
    let operation = if use_color {
        use colored::Colorize;
        item.operation_type.to_string().cyan().to_string()
    } else {
        item.operation_type.to_string()
    };
    let previous = item
        .previous_broker
        .as_ref()
        .map(|b| b.to_string())
        .unwrap_or_else(|| "-".to_string());
    let broker = item
        .broker
        .as_ref()
        .map(|b| b.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {operation} lead {} {previous} -> {broker} ({}, by {})",
        item.timestamp.format("%Y-%m-%d %H:%M"),
        item.lead.id,
        item.reason,
        item.responsible,
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use leadflow_core::model::LeadIdentity;

    use super::*;

    #[test]
    fn default_window_uses_lookback() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap();
        let filter = AuditArgs::default().to_filter(now, 30);
        assert_eq!(filter.from, Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()));
        assert_eq!(filter.to, None);
    }

    #[test]
    fn maps_dimension_flags() {
        let args = AuditArgs {
            brokers: vec!["ana".into()],
            stages: vec!["Visita".into()],
            queues: vec!["site".into()],
            operations: vec![OperationType::Escalation],
            ..AuditArgs::default()
        };
        let filter = args.to_filter(Utc::now(), 30);
        assert_eq!(filter.brokers, vec!["ana".into()]);
        assert_eq!(filter.stages, vec!["Visita".to_string()]);
        assert_eq!(filter.target_queues, vec!["site".into()]);
        assert_eq!(filter.operation_types, vec![OperationType::Escalation]);
    }

    #[test]
    fn formats_items_without_color() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let mut item = RedistributionHistoryItem::new(
            LeadIdentity::new("l1"),
            OperationType::Redistribution,
            "sem retorno",
            at,
        );
        item.previous_broker = Some("ana".into());
        item.broker = Some("bruno".into());
        assert_eq!(
            format_item(&item, false),
            "2026-03-02 12:00 redistribution lead l1 ana -> bruno (sem retorno, by system)"
        );
    }
}
