// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborators that only log what they are asked to do.
//!
//! Used by the CLI when no CRM integration is wired in, so a `tick` or
//! `route` run shows the effects it would have produced.

use async_trait::async_trait;
use leadflow_core::traits::Collaborators;
use leadflow_core::{
    Assignment, LeadId, LeadflowError, ManagerTask, QueueId, RetryReminder, StepDispatch,
};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCollaborators;

#[async_trait]
impl Collaborators for LoggingCollaborators {
    async fn dispatch_step(&self, dispatch: &StepDispatch) -> Result<(), LeadflowError> {
        info!(
            instance_id = %dispatch.instance_id,
            lead_id = %dispatch.lead_id,
            step_id = %dispatch.step_id,
            channel = %dispatch.channel,
            agent_id = dispatch.agent_id.as_ref().map(|a| a.as_str()).unwrap_or("-"),
            due_at = %dispatch.due_at,
            "step due"
        );
        Ok(())
    }

    async fn remind_retry(&self, reminder: &RetryReminder) -> Result<(), LeadflowError> {
        info!(
            instance_id = %reminder.instance_id,
            lead_id = %reminder.lead_id,
            counted = reminder.counted_attempts,
            required = reminder.required_attempts,
            "retry reminder"
        );
        Ok(())
    }

    async fn create_manager_task(&self, task: &ManagerTask) -> Result<(), LeadflowError> {
        info!(lead_id = %task.lead_id, cadence_id = %task.cadence_id, reason = %task.reason, "manager task");
        Ok(())
    }

    async fn discard_lead(&self, lead_id: &LeadId, reason: &str) -> Result<(), LeadflowError> {
        info!(lead_id = %lead_id, reason, "lead discarded");
        Ok(())
    }

    async fn move_to_queue(
        &self,
        lead_id: &LeadId,
        queue_id: Option<&QueueId>,
    ) -> Result<(), LeadflowError> {
        info!(
            lead_id = %lead_id,
            queue_id = queue_id.map(|q| q.as_str()).unwrap_or("(default)"),
            "lead moved"
        );
        Ok(())
    }

    async fn start_post_sale(&self, lead_id: &LeadId, offset_days: u32) -> Result<(), LeadflowError> {
        info!(lead_id = %lead_id, offset_days, "post-sale started");
        Ok(())
    }

    async fn notify_assignment(&self, assignment: &Assignment) -> Result<(), LeadflowError> {
        info!(
            lead_id = %assignment.lead_id,
            queue_id = %assignment.queue_id,
            agent_id = %assignment.agent_id,
            "assignment"
        );
        Ok(())
    }
}
