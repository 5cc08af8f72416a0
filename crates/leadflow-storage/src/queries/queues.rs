// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue definitions and optimistic rotation-state writes.

use leadflow_core::LeadflowError;
use leadflow_core::model::{Queue, RedistributionHistoryItem};
use leadflow_core::types::QueueId;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, decode, encode, map_tr_err};
use crate::queries::history;

pub async fn get(db: &Database, id: &QueueId) -> Result<Option<Queue>, LeadflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Queue>, rusqlite::Error> {
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM queues WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            doc.as_deref().map(decode).transpose()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list(db: &Database) -> Result<Vec<Queue>, LeadflowError> {
    db.connection()
        .call(|conn| -> Result<Vec<Queue>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT doc FROM queues ORDER BY position ASC, seq ASC")?;
            let docs = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            docs.iter().map(|doc| decode(doc)).collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Replace a definition, carrying the stored rotation state forward.
pub async fn put(db: &Database, queue: &Queue) -> Result<u64, LeadflowError> {
    let mut incoming = queue.clone();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let tx = conn.transaction()?;
            let stored: Option<String> = tx
                .query_row(
                    "SELECT doc FROM queues WHERE id = ?1",
                    params![incoming.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let version = match stored.as_deref().map(decode::<Queue>).transpose()? {
                Some(stored) => {
                    incoming.reconcile_rotation_from(&stored);
                    stored.version + 1
                }
                None => {
                    incoming.repair_cursor();
                    1
                }
            };
            incoming.version = version;
            tx.execute(
                "INSERT INTO queues (id, position, version, doc) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    position = excluded.position,
                    version = excluded.version,
                    doc = excluded.doc,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    incoming.id.as_str(),
                    incoming.position,
                    version as i64,
                    encode(&incoming)?
                ],
            )?;
            tx.commit()?;
            Ok(version)
        })
        .await
        .map_err(map_tr_err)
}

enum SaveResult {
    Saved(u64),
    Stale,
    Missing,
}

/// Compare-and-swap on the queue version.
pub async fn save_state(db: &Database, queue: &Queue) -> Result<u64, LeadflowError> {
    commit(db, queue, None).await
}

/// Compare-and-swap on the queue version, appending `entry` in the same
/// transaction.
pub async fn commit(
    db: &Database,
    queue: &Queue,
    entry: Option<&RedistributionHistoryItem>,
) -> Result<u64, LeadflowError> {
    let mut next = queue.clone();
    let expected = queue.version;
    next.version = expected + 1;
    let entry = entry.cloned();
    let result = db
        .connection()
        .call(move |conn| -> Result<SaveResult, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE queues SET version = ?1, doc = ?2,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3 AND version = ?4",
                params![
                    next.version as i64,
                    encode(&next)?,
                    next.id.as_str(),
                    expected as i64
                ],
            )?;
            if changed == 1 {
                if let Some(item) = &entry {
                    history::insert(&tx, item)?;
                }
                tx.commit()?;
                return Ok(SaveResult::Saved(next.version));
            }
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM queues WHERE id = ?1",
                    params![next.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(if exists.is_some() {
                SaveResult::Stale
            } else {
                SaveResult::Missing
            })
        })
        .await
        .map_err(map_tr_err)?;

    match result {
        SaveResult::Saved(version) => Ok(version),
        SaveResult::Stale => Err(LeadflowError::Conflict {
            entity: "queue",
            id: queue.id.to_string(),
        }),
        SaveResult::Missing => Err(LeadflowError::NotFound {
            entity: "queue",
            id: queue.id.to_string(),
        }),
    }
}

pub async fn delete(db: &Database, id: &QueueId) -> Result<bool, LeadflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            Ok(conn.execute("DELETE FROM queues WHERE id = ?1", params![id])? > 0)
        })
        .await
        .map_err(map_tr_err)
}
