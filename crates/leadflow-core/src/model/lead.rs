// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-lead assignment record.
//!
//! The lead's current queue and broker live here, not on its cadence
//! instances; instances carry a copy for dispatch that the engine keeps in
//! step with this record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::audit::{OperationType, Responsible};
use crate::types::{AgentId, LeadId, QueueId};

/// A reassignment that could not run yet, retried on the lead's next event
/// and on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRedistribution {
    pub queue_id: QueueId,
    pub operation: OperationType,
    pub reason: String,
    #[serde(default)]
    pub responsible: Responsible,
    pub requested_at: DateTime<Utc>,
}

/// Where a lead currently sits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadState {
    pub lead_id: LeadId,
    #[serde(default)]
    pub queue_id: Option<QueueId>,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending: Option<PendingRedistribution>,
    pub updated_at: DateTime<Utc>,
}

impl LeadState {
    pub fn new(lead_id: LeadId, now: DateTime<Utc>) -> Self {
        Self {
            lead_id,
            queue_id: None,
            agent_id: None,
            assigned_at: None,
            pending: None,
            updated_at: now,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.agent_id.is_some()
    }

    /// Record a completed assignment. Clears any pending redistribution.
    pub fn assign(&mut self, queue_id: QueueId, agent_id: AgentId, at: DateTime<Utc>) {
        self.queue_id = Some(queue_id);
        self.agent_id = Some(agent_id);
        self.assigned_at = Some(at);
        self.pending = None;
        self.updated_at = at;
    }

    pub fn defer(&mut self, pending: PendingRedistribution) {
        self.updated_at = pending.requested_at;
        self.pending = Some(pending);
    }
}
