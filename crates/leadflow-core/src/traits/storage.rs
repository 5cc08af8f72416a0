// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repository traits implemented by the memory and SQLite backends.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::model::audit::{AuditFilter, RedistributionHistoryItem};
use crate::model::cadence::Cadence;
use crate::model::instance::CadenceInstance;
use crate::model::lead::LeadState;
use crate::model::queue::Queue;
use crate::types::{CadenceId, InstanceId, LeadId, QueueId};

/// Queue definitions plus their rotation state.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn get_queue(&self, id: &QueueId) -> Result<Option<Queue>, LeadflowError>;

    /// All queues in evaluation order (position, then insertion).
    async fn list_queues(&self) -> Result<Vec<Queue>, LeadflowError>;

    /// Full-document replace of a definition.
    ///
    /// The stored rotation cursor and member counters win over the incoming
    /// document (see [`Queue::reconcile_rotation_from`]). Returns the new
    /// version.
    async fn put_queue(&self, queue: &Queue) -> Result<u64, LeadflowError>;

    /// Persist rotation state only if the stored version still equals
    /// `queue.version`; fails with [`LeadflowError::Conflict`] otherwise.
    /// Returns the new version.
    async fn save_queue_state(&self, queue: &Queue) -> Result<u64, LeadflowError>;

    /// [`save_queue_state`](Self::save_queue_state) plus the assignment's
    /// history entry in one write. On any error, including a version
    /// conflict, neither is stored.
    async fn commit_assignment(
        &self,
        queue: &Queue,
        entry: Option<&RedistributionHistoryItem>,
    ) -> Result<u64, LeadflowError>;

    async fn delete_queue(&self, id: &QueueId) -> Result<bool, LeadflowError>;
}

#[async_trait]
pub trait CadenceStore: Send + Sync {
    async fn get_cadence(&self, id: &CadenceId) -> Result<Option<Cadence>, LeadflowError>;

    async fn list_cadences(&self) -> Result<Vec<Cadence>, LeadflowError>;

    /// Full-document replace. Returns the new version.
    async fn put_cadence(&self, cadence: &Cadence) -> Result<u64, LeadflowError>;

    async fn delete_cadence(&self, id: &CadenceId) -> Result<bool, LeadflowError>;
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instance(&self, id: &InstanceId)
    -> Result<Option<CadenceInstance>, LeadflowError>;

    /// Instances of one lead, oldest first.
    async fn instances_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<CadenceInstance>, LeadflowError>;

    /// Instances the tick loop must consider.
    async fn schedulable_instances(&self) -> Result<Vec<CadenceInstance>, LeadflowError>;

    async fn put_instance(&self, instance: &CadenceInstance) -> Result<(), LeadflowError>;
}

/// Current queue and broker of each lead.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get_lead(&self, id: &LeadId) -> Result<Option<LeadState>, LeadflowError>;

    async fn put_lead(&self, lead: &LeadState) -> Result<(), LeadflowError>;

    /// Leads holding a deferred redistribution, oldest request first.
    async fn pending_leads(&self) -> Result<Vec<LeadState>, LeadflowError>;
}

/// Append-only redistribution history.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Durably append one record. Records are never updated or deleted.
    async fn append(&self, item: &RedistributionHistoryItem) -> Result<(), LeadflowError>;

    /// Records matching `filter`, in no particular order.
    async fn query(
        &self,
        filter: &AuditFilter,
    ) -> Result<Vec<RedistributionHistoryItem>, LeadflowError>;
}

/// A backend implementing every repository.
pub trait Storage: QueueStore + CadenceStore + InstanceStore + LeadStore + AuditStore {}

impl<T> Storage for T where T: QueueStore + CadenceStore + InstanceStore + LeadStore + AuditStore {}

/// One backend viewed through each repository trait.
#[derive(Clone)]
pub struct Stores {
    pub queues: Arc<dyn QueueStore>,
    pub cadences: Arc<dyn CadenceStore>,
    pub instances: Arc<dyn InstanceStore>,
    pub leads: Arc<dyn LeadStore>,
    pub audit: Arc<dyn AuditStore>,
}

impl Stores {
    pub fn new<T: Storage + 'static>(backend: Arc<T>) -> Self {
        Self {
            queues: backend.clone(),
            cadences: backend.clone(),
            instances: backend.clone(),
            leads: backend.clone(),
            audit: backend,
        }
    }
}
