// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-lead assignment documents.

use leadflow_core::LeadflowError;
use leadflow_core::model::LeadState;
use leadflow_core::types::LeadId;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, decode, encode, map_tr_err, timestamp};

pub async fn get(db: &Database, id: &LeadId) -> Result<Option<LeadState>, LeadflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<LeadState>, rusqlite::Error> {
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM leads WHERE lead_id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            doc.as_deref().map(decode).transpose()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn put(db: &Database, lead: &LeadState) -> Result<(), LeadflowError> {
    let lead = lead.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO leads (lead_id, agent_id, pending, pending_since, updated_at, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(lead_id) DO UPDATE SET
                    agent_id = excluded.agent_id,
                    pending = excluded.pending,
                    pending_since = excluded.pending_since,
                    updated_at = excluded.updated_at,
                    doc = excluded.doc",
                params![
                    lead.lead_id.as_str(),
                    lead.agent_id.as_ref().map(|a| a.to_string()),
                    lead.pending.is_some(),
                    lead.pending.as_ref().map(|p| timestamp(p.requested_at)),
                    timestamp(lead.updated_at),
                    encode(&lead)?
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn pending(db: &Database) -> Result<Vec<LeadState>, LeadflowError> {
    db.connection()
        .call(|conn| -> Result<Vec<LeadState>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT doc FROM leads WHERE pending = 1 ORDER BY pending_since ASC, lead_id ASC",
            )?;
            let docs = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            docs.iter().map(|doc| decode(doc)).collect()
        })
        .await
        .map_err(map_tr_err)
}
