// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Side-effecting services the engine delegates to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::LeadflowError;
use crate::model::cadence::StepOwner;
use crate::types::{AgentId, CadenceId, Channel, InstanceId, LeadId, QueueId, StepId};

/// A step that became active and should be performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDispatch {
    pub instance_id: InstanceId,
    pub lead_id: LeadId,
    pub cadence_id: CadenceId,
    pub step_id: StepId,
    pub step_name: String,
    pub channel: Channel,
    pub owner: StepOwner,
    pub agent_id: Option<AgentId>,
    pub template: Option<String>,
    pub due_at: DateTime<Utc>,
}

/// Follow-up task for a manager after failed attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerTask {
    pub instance_id: InstanceId,
    pub lead_id: LeadId,
    pub cadence_id: CadenceId,
    pub agent_id: Option<AgentId>,
    pub reason: String,
}

/// A lead handed to a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub lead_id: LeadId,
    pub queue_id: QueueId,
    pub agent_id: AgentId,
    pub previous_agent_id: Option<AgentId>,
    pub assigned_at: DateTime<Utc>,
}

/// Nudge to keep trying while below the attempt threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryReminder {
    pub instance_id: InstanceId,
    pub lead_id: LeadId,
    pub agent_id: Option<AgentId>,
    pub counted_attempts: u32,
    pub required_attempts: u32,
}

/// External services the engine drives.
///
/// The engine persists a transition before dispatching its effects, so each
/// effect is delivered at most once. A failed dispatch is reported to the
/// caller and not retried.
#[async_trait]
pub trait Collaborators: Send + Sync {
    /// Perform or schedule an outreach step.
    async fn dispatch_step(&self, dispatch: &StepDispatch) -> Result<(), LeadflowError>;

    async fn remind_retry(&self, reminder: &RetryReminder) -> Result<(), LeadflowError>;

    async fn create_manager_task(&self, task: &ManagerTask) -> Result<(), LeadflowError>;

    async fn discard_lead(&self, lead_id: &LeadId, reason: &str) -> Result<(), LeadflowError>;

    /// Move the lead to a queue; `None` means the primary queue could not be
    /// resolved and the CRM's default applies.
    async fn move_to_queue(
        &self,
        lead_id: &LeadId,
        queue_id: Option<&QueueId>,
    ) -> Result<(), LeadflowError>;

    async fn start_post_sale(&self, lead_id: &LeadId, offset_days: u32)
    -> Result<(), LeadflowError>;

    async fn notify_assignment(&self, assignment: &Assignment) -> Result<(), LeadflowError>;
}
