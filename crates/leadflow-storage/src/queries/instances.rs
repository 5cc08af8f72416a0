// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadence instance documents.

use leadflow_core::LeadflowError;
use leadflow_core::model::CadenceInstance;
use leadflow_core::types::{InstanceId, LeadId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, decode, encode, map_tr_err, timestamp};

pub async fn get(db: &Database, id: &InstanceId) -> Result<Option<CadenceInstance>, LeadflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<CadenceInstance>, rusqlite::Error> {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM cadence_instances WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            doc.as_deref().map(decode).transpose()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn for_lead(db: &Database, lead_id: &LeadId) -> Result<Vec<CadenceInstance>, LeadflowError> {
    let lead_id = lead_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<CadenceInstance>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT doc FROM cadence_instances WHERE lead_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let docs = stmt
                .query_map(params![lead_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            docs.iter().map(|doc| decode(doc)).collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn schedulable(db: &Database) -> Result<Vec<CadenceInstance>, LeadflowError> {
    db.connection()
        .call(|conn| -> Result<Vec<CadenceInstance>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT doc FROM cadence_instances WHERE schedulable = 1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let docs = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            docs.iter().map(|doc| decode(doc)).collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn put(db: &Database, instance: &CadenceInstance) -> Result<(), LeadflowError> {
    let instance = instance.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO cadence_instances
                    (id, lead_id, cadence_id, state, schedulable, created_at, updated_at, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    state = excluded.state,
                    schedulable = excluded.schedulable,
                    updated_at = excluded.updated_at,
                    doc = excluded.doc",
                params![
                    instance.id.as_str(),
                    instance.lead_id.as_str(),
                    instance.cadence_id.as_str(),
                    instance.state.name(),
                    instance.is_schedulable(),
                    timestamp(instance.created_at),
                    timestamp(instance.updated_at),
                    encode(&instance)?
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
