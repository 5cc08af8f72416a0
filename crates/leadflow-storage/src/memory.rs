// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory backend with the same versioning semantics as SQLite.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use leadflow_core::LeadflowError;
use leadflow_core::model::{
    AuditFilter, Cadence, CadenceInstance, LeadState, Queue, RedistributionHistoryItem,
};
use leadflow_core::traits::{AuditStore, CadenceStore, InstanceStore, LeadStore, QueueStore};
use leadflow_core::types::{CadenceId, InstanceId, LeadId, QueueId};

/// Process-local storage. Vectors keep insertion order.
#[derive(Default)]
pub struct MemoryStorage {
    queues: RwLock<Vec<Queue>>,
    cadences: RwLock<Vec<Cadence>>,
    instances: RwLock<InstanceTable>,
    leads: RwLock<HashMap<LeadId, LeadState>>,
    history: RwLock<Vec<RedistributionHistoryItem>>,
}

#[derive(Default)]
struct InstanceTable {
    order: Vec<InstanceId>,
    rows: HashMap<InstanceId, CadenceInstance>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStorage {
    async fn get_queue(&self, id: &QueueId) -> Result<Option<Queue>, LeadflowError> {
        Ok(self.queues.read().await.iter().find(|q| &q.id == id).cloned())
    }

    async fn list_queues(&self) -> Result<Vec<Queue>, LeadflowError> {
        let mut queues = self.queues.read().await.clone();
        queues.sort_by_key(|q| q.position);
        Ok(queues)
    }

    async fn put_queue(&self, queue: &Queue) -> Result<u64, LeadflowError> {
        let mut queues = self.queues.write().await;
        let mut incoming = queue.clone();
        match queues.iter_mut().find(|q| q.id == queue.id) {
            Some(stored) => {
                incoming.reconcile_rotation_from(stored);
                incoming.version = stored.version + 1;
                *stored = incoming;
                Ok(stored.version)
            }
            None => {
                incoming.repair_cursor();
                incoming.version = 1;
                queues.push(incoming);
                Ok(1)
            }
        }
    }

    async fn save_queue_state(&self, queue: &Queue) -> Result<u64, LeadflowError> {
        let mut queues = self.queues.write().await;
        let stored = current_version(&mut queues, queue)?;
        *stored = queue.clone();
        stored.version = queue.version + 1;
        Ok(stored.version)
    }

    async fn commit_assignment(
        &self,
        queue: &Queue,
        entry: Option<&RedistributionHistoryItem>,
    ) -> Result<u64, LeadflowError> {
        // Queues before history, the only place both are held.
        let mut queues = self.queues.write().await;
        let mut history = self.history.write().await;
        let stored = current_version(&mut queues, queue)?;
        if let Some(item) = entry {
            if history.iter().any(|existing| existing.id == item.id) {
                return Err(duplicate_item(item));
            }
            history.push(item.clone());
        }
        *stored = queue.clone();
        stored.version = queue.version + 1;
        Ok(stored.version)
    }

    async fn delete_queue(&self, id: &QueueId) -> Result<bool, LeadflowError> {
        let mut queues = self.queues.write().await;
        let before = queues.len();
        queues.retain(|q| &q.id != id);
        Ok(queues.len() != before)
    }
}

#[async_trait]
impl CadenceStore for MemoryStorage {
    async fn get_cadence(&self, id: &CadenceId) -> Result<Option<Cadence>, LeadflowError> {
        Ok(self
            .cadences
            .read()
            .await
            .iter()
            .find(|c| &c.id == id)
            .cloned())
    }

    async fn list_cadences(&self) -> Result<Vec<Cadence>, LeadflowError> {
        Ok(self.cadences.read().await.clone())
    }

    async fn put_cadence(&self, cadence: &Cadence) -> Result<u64, LeadflowError> {
        let mut cadences = self.cadences.write().await;
        let mut incoming = cadence.clone();
        match cadences.iter_mut().find(|c| c.id == cadence.id) {
            Some(stored) => {
                incoming.version = stored.version + 1;
                *stored = incoming;
                Ok(stored.version)
            }
            None => {
                incoming.version = 1;
                cadences.push(incoming);
                Ok(1)
            }
        }
    }

    async fn delete_cadence(&self, id: &CadenceId) -> Result<bool, LeadflowError> {
        let mut cadences = self.cadences.write().await;
        let before = cadences.len();
        cadences.retain(|c| &c.id != id);
        Ok(cadences.len() != before)
    }
}

#[async_trait]
impl InstanceStore for MemoryStorage {
    async fn get_instance(&self, id: &InstanceId) -> Result<Option<CadenceInstance>, LeadflowError> {
        Ok(self.instances.read().await.rows.get(id).cloned())
    }

    async fn instances_for_lead(&self, lead_id: &LeadId) -> Result<Vec<CadenceInstance>, LeadflowError> {
        let table = self.instances.read().await;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.rows.get(id))
            .filter(|inst| &inst.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn schedulable_instances(&self) -> Result<Vec<CadenceInstance>, LeadflowError> {
        let table = self.instances.read().await;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.rows.get(id))
            .filter(|inst| inst.is_schedulable())
            .cloned()
            .collect())
    }

    async fn put_instance(&self, instance: &CadenceInstance) -> Result<(), LeadflowError> {
        let mut table = self.instances.write().await;
        if table.rows.insert(instance.id.clone(), instance.clone()).is_none() {
            table.order.push(instance.id.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl LeadStore for MemoryStorage {
    async fn get_lead(&self, id: &LeadId) -> Result<Option<LeadState>, LeadflowError> {
        Ok(self.leads.read().await.get(id).cloned())
    }

    async fn put_lead(&self, lead: &LeadState) -> Result<(), LeadflowError> {
        self.leads
            .write()
            .await
            .insert(lead.lead_id.clone(), lead.clone());
        Ok(())
    }

    async fn pending_leads(&self) -> Result<Vec<LeadState>, LeadflowError> {
        let mut pending: Vec<LeadState> = self
            .leads
            .read()
            .await
            .values()
            .filter(|lead| lead.pending.is_some())
            .cloned()
            .collect();
        pending.sort_by_key(|lead| lead.pending.as_ref().map(|p| p.requested_at));
        Ok(pending)
    }
}

#[async_trait]
impl AuditStore for MemoryStorage {
    async fn append(&self, item: &RedistributionHistoryItem) -> Result<(), LeadflowError> {
        let mut history = self.history.write().await;
        if history.iter().any(|existing| existing.id == item.id) {
            return Err(duplicate_item(item));
        }
        history.push(item.clone());
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<RedistributionHistoryItem>, LeadflowError> {
        Ok(self
            .history
            .read()
            .await
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect())
    }
}

/// The stored queue, if its version still equals `queue.version`.
fn current_version<'q>(queues: &'q mut [Queue], queue: &Queue) -> Result<&'q mut Queue, LeadflowError> {
    let stored = queues
        .iter_mut()
        .find(|q| q.id == queue.id)
        .ok_or_else(|| LeadflowError::NotFound {
            entity: "queue",
            id: queue.id.to_string(),
        })?;
    if stored.version != queue.version {
        return Err(LeadflowError::Conflict {
            entity: "queue",
            id: queue.id.to_string(),
        });
    }
    Ok(stored)
}

fn duplicate_item(item: &RedistributionHistoryItem) -> LeadflowError {
    LeadflowError::Conflict {
        entity: "redistribution history item",
        id: item.id.clone(),
    }
}
