// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! What engine operations did.

use chrono::{DateTime, Utc};
use leadflow_core::model::CadenceInstance;
use leadflow_core::{AgentId, CadenceId, InstanceId, LeadId, QueueId};
use leadflow_router::AssignmentOutcome;
use serde::Serialize;

/// Result of routing a lead to a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Distribution {
    /// The lead already has a broker and nothing was pending.
    NotRequired,
    /// No queue's rules matched the record.
    Unrouted,
    /// A queue matched but nobody in it (or its overflow queue) was eligible.
    #[serde(rename_all = "camelCase")]
    NoEligibleAgent { queue_id: QueueId },
    #[serde(rename_all = "camelCase")]
    Assigned {
        queue_id: QueueId,
        agent_id: AgentId,
        overflowed_from: Option<QueueId>,
    },
}

impl Distribution {
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Distribution::Assigned { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    pub fn queue_id(&self) -> Option<&QueueId> {
        match self {
            Distribution::Assigned { queue_id, .. } | Distribution::NoEligibleAgent { queue_id } => {
                Some(queue_id)
            }
            _ => None,
        }
    }
}

impl From<AssignmentOutcome> for Distribution {
    fn from(outcome: AssignmentOutcome) -> Self {
        Distribution::Assigned {
            queue_id: outcome.queue_id,
            agent_id: outcome.agent_id,
            overflowed_from: outcome.overflowed_from,
        }
    }
}

/// Effects delivered by one transition and the collaborator failures among them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub dispatched: usize,
    pub errors: Vec<String>,
    /// Instance started by a move-to-cadence outcome.
    pub follow_up: Option<InstanceId>,
    /// Broker the lead was assigned to. Open instances are pointed at it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<AgentId>,
}

impl DispatchSummary {
    pub(crate) fn absorb(&mut self, other: DispatchSummary) {
        self.dispatched += other.dispatched;
        self.errors.extend(other.errors);
        if other.follow_up.is_some() {
            self.follow_up = other.follow_up;
        }
        if other.assigned_to.is_some() {
            self.assigned_to = other.assigned_to;
        }
    }
}

/// Result of [`Engine::handle_event`](crate::Engine::handle_event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReport {
    pub lead_id: LeadId,
    pub distribution: Distribution,
    pub started: Vec<InstanceId>,
    /// Cadences that matched but already have an open instance for the lead.
    pub skipped: Vec<CadenceId>,
    pub dispatch: DispatchSummary,
}

impl EventReport {
    pub(crate) fn new(lead_id: LeadId) -> Self {
        Self {
            lead_id,
            distribution: Distribution::NotRequired,
            started: Vec::new(),
            skipped: Vec::new(),
            dispatch: DispatchSummary::default(),
        }
    }
}

/// Result of a command on one cadence instance.
#[derive(Debug, Clone)]
pub struct CommandReport<T> {
    pub value: T,
    /// The instance as persisted after the command.
    pub instance: CadenceInstance,
    pub dispatch: DispatchSummary,
}

/// An instance the tick could not advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceFailure {
    pub instance_id: InstanceId,
    pub error: String,
}

/// Result of [`Engine::tick`](crate::Engine::tick).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub examined: usize,
    pub advanced: usize,
    /// Leads whose pending redistribution went through.
    pub reassigned: usize,
    pub dispatched: usize,
    pub dispatch_errors: Vec<String>,
    pub failures: Vec<InstanceFailure>,
}

impl TickReport {
    pub(crate) fn new(at: DateTime<Utc>, examined: usize) -> Self {
        Self {
            at,
            examined,
            advanced: 0,
            reassigned: 0,
            dispatched: 0,
            dispatch_errors: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.dispatch_errors.is_empty()
    }
}

/// Result of [`Engine::import_definitions`](crate::Engine::import_definitions).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub queues: usize,
    pub cadences: usize,
}

/// Result of [`Engine::redistribute`](crate::Engine::redistribute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedistributionReport {
    pub queue_id: QueueId,
    pub agent_id: AgentId,
    pub previous_agent_id: Option<AgentId>,
    /// Open instances now pointing at the new broker.
    pub updated_instances: Vec<InstanceId>,
    pub dispatch: DispatchSummary,
}

/// Where a record would be routed, without assigning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePreview {
    pub queue_id: Option<QueueId>,
    /// Next broker in rotation, if anyone is eligible.
    pub agent_id: Option<AgentId>,
}
