// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadence definitions.

use leadflow_core::LeadflowError;
use leadflow_core::model::Cadence;
use leadflow_core::types::CadenceId;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, decode, encode, map_tr_err};

pub async fn get(db: &Database, id: &CadenceId) -> Result<Option<Cadence>, LeadflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Cadence>, rusqlite::Error> {
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM cadences WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            doc.as_deref().map(decode).transpose()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list(db: &Database) -> Result<Vec<Cadence>, LeadflowError> {
    db.connection()
        .call(|conn| -> Result<Vec<Cadence>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT doc FROM cadences ORDER BY seq ASC")?;
            let docs = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            docs.iter().map(|doc| decode(doc)).collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn put(db: &Database, cadence: &Cadence) -> Result<u64, LeadflowError> {
    let mut incoming = cadence.clone();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let tx = conn.transaction()?;
            let stored: Option<i64> = tx
                .query_row(
                    "SELECT version FROM cadences WHERE id = ?1",
                    params![incoming.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let version = stored.map_or(1, |v| v as u64 + 1);
            incoming.version = version;
            tx.execute(
                "INSERT INTO cadences (id, version, active, doc) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    version = excluded.version,
                    active = excluded.active,
                    doc = excluded.doc,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    incoming.id.as_str(),
                    version as i64,
                    incoming.active,
                    encode(&incoming)?
                ],
            )?;
            tx.commit()?;
            Ok(version)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete(db: &Database, id: &CadenceId) -> Result<bool, LeadflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            Ok(conn.execute("DELETE FROM cadences WHERE id = ?1", params![id])? > 0)
        })
        .await
        .map_err(map_tr_err)
}
