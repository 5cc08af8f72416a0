// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivering scheduler effects to collaborators.
//!
//! Collaborator failures are recorded in the [`DispatchSummary`] and do not
//! undo the persisted transition. Storage failures propagate.
//!
//! Escalations that reassign the lead take the lead lock while the caller
//! holds the instance lock; see [`crate::locks`].

use chrono::{DateTime, Utc};
use leadflow_cadence::{SchedulerEffect, SchedulerEffects};
use leadflow_core::model::{
    Cadence, CadenceInstance, MoveTarget, OperationType, PostFailureAction, Responsible,
};
use leadflow_core::{CadenceId, LeadflowError, ManagerTask, RetryReminder, StepDispatch};
use tracing::{debug, info, warn};

use crate::engine::{Engine, Reassignment};
use crate::locks::lead_key;
use crate::metrics;
use crate::report::DispatchSummary;

const MOVED_TO_PRIMARY_REASON: &str = "moved to primary queue";

/// Fold one collaborator result into `summary`. Only fatal errors escape.
pub(crate) fn settle(
    summary: &mut DispatchSummary,
    call: &'static str,
    result: Result<(), LeadflowError>,
) -> Result<(), LeadflowError> {
    match result {
        Ok(()) => {
            summary.dispatched += 1;
            Ok(())
        }
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(call, error = %err, "collaborator call failed");
            metrics::record_dispatch_failure(call);
            summary.errors.push(format!("{call}: {err}"));
            Ok(())
        }
    }
}

impl Engine {
    /// Deliver `effects` for `instance`. Returns the cadence to open next
    /// when the instance moved to another cadence.
    pub(crate) async fn dispatch(
        &self,
        instance: &mut CadenceInstance,
        cadence: &Cadence,
        effects: SchedulerEffects,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) -> Result<Option<CadenceId>, LeadflowError> {
        let mut follow_up = None;
        for effect in effects {
            let (call, result) = match effect {
                SchedulerEffect::StepDue { step, due_at, .. } => {
                    let dispatch = StepDispatch {
                        instance_id: instance.id.clone(),
                        lead_id: instance.lead_id.clone(),
                        cadence_id: cadence.id.clone(),
                        step_id: step.id,
                        step_name: step.name,
                        channel: step.channel,
                        owner: step.owner,
                        agent_id: instance.agent_id.clone(),
                        template: step.template,
                        due_at,
                    };
                    ("dispatch_step", self.collaborators.dispatch_step(&dispatch).await)
                }
                SchedulerEffect::RetryReminder { counted, required } => {
                    let reminder = RetryReminder {
                        instance_id: instance.id.clone(),
                        lead_id: instance.lead_id.clone(),
                        agent_id: instance.agent_id.clone(),
                        counted_attempts: counted,
                        required_attempts: required,
                    };
                    ("remind_retry", self.collaborators.remind_retry(&reminder).await)
                }
                SchedulerEffect::Escalated { action, reason } => {
                    metrics::record_escalation(action);
                    let result = self
                        .escalate(instance, cadence, action, &reason, now, summary)
                        .await;
                    ("escalate", result)
                }
                SchedulerEffect::Moved { target } => match target {
                    MoveTarget::Cadence { cadence_id } => {
                        follow_up = Some(cadence_id);
                        continue;
                    }
                    MoveTarget::PostSale { offset_days } => (
                        "start_post_sale",
                        self.collaborators
                            .start_post_sale(&instance.lead_id, offset_days)
                            .await,
                    ),
                    MoveTarget::PrimaryQueue => (
                        "move_to_queue",
                        self.move_to_primary(instance, now, summary).await,
                    ),
                },
                SchedulerEffect::Paused { reason, until } => {
                    debug!(instance_id = %instance.id, reason = ?reason, until = ?until, "cadence paused");
                    continue;
                }
                SchedulerEffect::Resumed { index } => {
                    debug!(instance_id = %instance.id, index, "cadence resumed");
                    continue;
                }
                SchedulerEffect::Completed { reason } => {
                    info!(instance_id = %instance.id, lead_id = %instance.lead_id, reason = ?reason, "cadence completed");
                    continue;
                }
            };
            settle(summary, call, result)?;
        }
        Ok(follow_up)
    }

    async fn escalate(
        &self,
        instance: &mut CadenceInstance,
        cadence: &Cadence,
        action: PostFailureAction,
        reason: &str,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) -> Result<(), LeadflowError> {
        match action {
            PostFailureAction::Discard => {
                self.collaborators
                    .discard_lead(&instance.lead_id, reason)
                    .await
            }
            PostFailureAction::CreateManagerTask => {
                let task = ManagerTask {
                    instance_id: instance.id.clone(),
                    lead_id: instance.lead_id.clone(),
                    cadence_id: cadence.id.clone(),
                    agent_id: instance.agent_id.clone(),
                    reason: reason.to_string(),
                };
                self.collaborators.create_manager_task(&task).await
            }
            PostFailureAction::Redistribute => {
                let queue_id = match instance.queue_id.clone() {
                    Some(queue_id) => Some(queue_id),
                    None => self.primary_queue().await?.map(|q| q.id),
                };
                let Some(queue_id) = queue_id else {
                    warn!(lead_id = %instance.lead_id, "no queue to redistribute from, leaving it to the CRM default");
                    return self
                        .collaborators
                        .move_to_queue(&instance.lead_id, None)
                        .await;
                };
                let request = Reassignment {
                    record: None,
                    queue_id,
                    operation: OperationType::Escalation,
                    reason,
                    responsible: Responsible::System,
                };
                self.reassign_instance(instance, request, now, summary)
                    .await
            }
        }
    }

    /// Reassign the instance's lead under the lead lock and point `instance`
    /// at the new broker. When nobody is eligible the request is stored as
    /// the lead's pending redistribution and the error is returned.
    async fn reassign_instance(
        &self,
        instance: &mut CadenceInstance,
        request: Reassignment<'_>,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) -> Result<(), LeadflowError> {
        let _guard = self.locks.lock(lead_key(&instance.lead_id)).await;
        let mut state = self.lead_state(&instance.lead_id, now).await?;
        let pending = request.defer(now);
        let result = self.reassign(&mut state, request, now, summary).await;
        match result {
            Ok(outcome) => {
                self.stores.leads.put_lead(&state).await?;
                instance.queue_id = Some(outcome.queue_id);
                instance.agent_id = Some(outcome.agent_id);
                Ok(())
            }
            Err(err @ LeadflowError::NoEligibleAgent { .. }) => {
                warn!(lead_id = %instance.lead_id, queue_id = %pending.queue_id, "nobody eligible, redistribution left pending");
                state.defer(pending);
                self.stores.leads.put_lead(&state).await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Reassign from the primary queue and tell the CRM where the lead went.
    async fn move_to_primary(
        &self,
        instance: &mut CadenceInstance,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) -> Result<(), LeadflowError> {
        let Some(primary) = self.primary_queue().await? else {
            warn!(lead_id = %instance.lead_id, "no primary queue configured");
            return self
                .collaborators
                .move_to_queue(&instance.lead_id, None)
                .await;
        };

        let lead_id = instance.lead_id.clone();
        let request = Reassignment {
            record: None,
            queue_id: primary.id.clone(),
            operation: OperationType::Redistribution,
            reason: MOVED_TO_PRIMARY_REASON,
            responsible: Responsible::System,
        };
        let reassigned = self.reassign_instance(instance, request, now, summary).await;
        match reassigned {
            Ok(()) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(lead_id = %lead_id, queue_id = %primary.id, error = %err, "primary queue assignment failed");
                summary.errors.push(format!("assign from {}: {err}", primary.id));
            }
        }
        self.collaborators
            .move_to_queue(&lead_id, Some(&primary.id))
            .await
    }
}
