// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the repository traits.

use async_trait::async_trait;

use leadflow_core::LeadflowError;
use leadflow_core::model::{
    AuditFilter, Cadence, CadenceInstance, LeadState, Queue, RedistributionHistoryItem,
};
use leadflow_core::traits::{AuditStore, CadenceStore, InstanceStore, LeadStore, QueueStore};
use leadflow_core::types::{CadenceId, InstanceId, LeadId, QueueId};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage delegating to the typed query modules.
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, LeadflowError> {
        Ok(Self::new(Database::open_with(path, wal_mode).await?))
    }

    pub async fn open_in_memory() -> Result<Self, LeadflowError> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Flush the WAL before shutdown.
    pub async fn close(&self) -> Result<(), LeadflowError> {
        self.db.checkpoint().await
    }
}

#[async_trait]
impl QueueStore for SqliteStorage {
    async fn get_queue(&self, id: &QueueId) -> Result<Option<Queue>, LeadflowError> {
        queries::queues::get(&self.db, id).await
    }

    async fn list_queues(&self) -> Result<Vec<Queue>, LeadflowError> {
        queries::queues::list(&self.db).await
    }

    async fn put_queue(&self, queue: &Queue) -> Result<u64, LeadflowError> {
        queries::queues::put(&self.db, queue).await
    }

    async fn save_queue_state(&self, queue: &Queue) -> Result<u64, LeadflowError> {
        queries::queues::save_state(&self.db, queue).await
    }

    async fn commit_assignment(
        &self,
        queue: &Queue,
        entry: Option<&RedistributionHistoryItem>,
    ) -> Result<u64, LeadflowError> {
        queries::queues::commit(&self.db, queue, entry).await
    }

    async fn delete_queue(&self, id: &QueueId) -> Result<bool, LeadflowError> {
        queries::queues::delete(&self.db, id).await
    }
}

#[async_trait]
impl CadenceStore for SqliteStorage {
    async fn get_cadence(&self, id: &CadenceId) -> Result<Option<Cadence>, LeadflowError> {
        queries::cadences::get(&self.db, id).await
    }

    async fn list_cadences(&self) -> Result<Vec<Cadence>, LeadflowError> {
        queries::cadences::list(&self.db).await
    }

    async fn put_cadence(&self, cadence: &Cadence) -> Result<u64, LeadflowError> {
        queries::cadences::put(&self.db, cadence).await
    }

    async fn delete_cadence(&self, id: &CadenceId) -> Result<bool, LeadflowError> {
        queries::cadences::delete(&self.db, id).await
    }
}

#[async_trait]
impl InstanceStore for SqliteStorage {
    async fn get_instance(&self, id: &InstanceId) -> Result<Option<CadenceInstance>, LeadflowError> {
        queries::instances::get(&self.db, id).await
    }

    async fn instances_for_lead(&self, lead_id: &LeadId) -> Result<Vec<CadenceInstance>, LeadflowError> {
        queries::instances::for_lead(&self.db, lead_id).await
    }

    async fn schedulable_instances(&self) -> Result<Vec<CadenceInstance>, LeadflowError> {
        queries::instances::schedulable(&self.db).await
    }

    async fn put_instance(&self, instance: &CadenceInstance) -> Result<(), LeadflowError> {
        queries::instances::put(&self.db, instance).await
    }
}

#[async_trait]
impl LeadStore for SqliteStorage {
    async fn get_lead(&self, id: &LeadId) -> Result<Option<LeadState>, LeadflowError> {
        queries::leads::get(&self.db, id).await
    }

    async fn put_lead(&self, lead: &LeadState) -> Result<(), LeadflowError> {
        queries::leads::put(&self.db, lead).await
    }

    async fn pending_leads(&self) -> Result<Vec<LeadState>, LeadflowError> {
        queries::leads::pending(&self.db).await
    }
}

#[async_trait]
impl AuditStore for SqliteStorage {
    async fn append(&self, item: &RedistributionHistoryItem) -> Result<(), LeadflowError> {
        queries::history::append(&self.db, item).await
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<RedistributionHistoryItem>, LeadflowError> {
        queries::history::query(&self.db, filter).await
    }
}
