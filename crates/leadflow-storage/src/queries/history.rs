// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only redistribution history.
//!
//! Triggers reject UPDATE and DELETE on the table. Queries push the indexed
//! dimensions down to SQL and apply the full filter to the decoded rows.

use leadflow_core::LeadflowError;
use leadflow_core::model::{AuditFilter, RedistributionHistoryItem};
use rusqlite::params;
use rusqlite::types::Value;

use crate::database::{Database, decode, encode, map_tr_err, timestamp};

pub async fn append(db: &Database, item: &RedistributionHistoryItem) -> Result<(), LeadflowError> {
    let item = item.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> { insert(conn, &item) })
        .await
        .map_err(map_tr_err)
}

/// Insert one row on `conn`, which may be an open transaction.
pub(crate) fn insert(
    conn: &rusqlite::Connection,
    item: &RedistributionHistoryItem,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO redistribution_history
            (id, operation_type, broker, source_queue, target_queue, stage,
             lead_id, timestamp, doc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            item.id,
            item.operation_type.to_string(),
            item.broker.as_ref().map(|b| b.to_string()),
            item.source_queue.as_ref().map(|q| q.to_string()),
            item.target_queue.as_ref().map(|q| q.to_string()),
            item.stage,
            item.lead.id.as_str(),
            timestamp(item.timestamp),
            encode(item)?
        ],
    )?;
    Ok(())
}

/// WHERE clause plus bound values for the pushed-down part of a filter.
fn where_clause(filter: &AuditFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    let mut any_of = |column: &str, items: Vec<String>| {
        if items.is_empty() {
            return;
        }
        let placeholders: Vec<String> = (0..items.len())
            .map(|i| format!("?{}", values.len() + i + 1))
            .collect();
        clauses.push(format!("{column} IN ({})", placeholders.join(", ")));
        values.extend(items.into_iter().map(Value::Text));
    };

    any_of(
        "operation_type",
        filter.operation_types.iter().map(ToString::to_string).collect(),
    );
    any_of("broker", filter.brokers.iter().map(ToString::to_string).collect());
    any_of(
        "source_queue",
        filter.source_queues.iter().map(ToString::to_string).collect(),
    );
    any_of(
        "target_queue",
        filter.target_queues.iter().map(ToString::to_string).collect(),
    );
    any_of("stage", filter.stages.clone());

    if let Some(from) = filter.from {
        values.push(Value::Text(timestamp(from)));
        clauses.push(format!("timestamp >= ?{}", values.len()));
    }
    if let Some(to) = filter.to {
        values.push(Value::Text(timestamp(to)));
        clauses.push(format!("timestamp <= ?{}", values.len()));
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (sql, values)
}

pub async fn query(
    db: &Database,
    filter: &AuditFilter,
) -> Result<Vec<RedistributionHistoryItem>, LeadflowError> {
    if filter.matches_nothing {
        return Ok(Vec::new());
    }
    let (clause, values) = where_clause(filter);
    let sql = format!("SELECT doc FROM redistribution_history{clause} ORDER BY seq ASC");
    let items = db
        .connection()
        .call(move |conn| -> Result<Vec<RedistributionHistoryItem>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let docs = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            docs.iter().map(|doc| decode(doc)).collect()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(items.into_iter().filter(|item| filter.matches(item)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::model::OperationType;

    #[test]
    fn empty_filter_has_no_where_clause() {
        let (sql, values) = where_clause(&AuditFilter::new());
        assert!(sql.is_empty());
        assert!(values.is_empty());
    }

    #[test]
    fn placeholders_are_numbered_across_dimensions() {
        let filter = AuditFilter::new()
            .operation(OperationType::Redistribution)
            .operation(OperationType::Overflow)
            .broker("ana")
            .stage("Qualificação");
        let (sql, values) = where_clause(&filter);
        assert_eq!(
            sql,
            " WHERE operation_type IN (?1, ?2) AND broker IN (?3) AND stage IN (?4)"
        );
        assert_eq!(values.len(), 4);
    }
}
