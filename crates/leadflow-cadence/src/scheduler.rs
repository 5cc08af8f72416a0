// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadence instance state machine.
//!
//! ```text
//! NotStarted -> StepActive(i) -> [WaitingForAttempt] -> StepActive(i+1) -> ...
//!            -> Completed | Paused | Moved
//! ```
//!
//! Every command mutates the instance in place and returns the effects the
//! caller must dispatch. Step deadlines are relative to the moment the step
//! became active; inactive steps are skipped.

use chrono::{DateTime, Duration, Utc};
use leadflow_core::LeadflowError;
use leadflow_core::model::{
    AttemptResult, Cadence, CadenceInstance, CompletionReason, InstanceState, MoveTarget,
    OutcomeAction, PauseReason, PostFailureAction, Step,
};
use leadflow_core::types::{Channel, LeadId};
use tracing::{debug, info};

use crate::outcome::{OutcomeFlags, OutcomeRouter, RoutedOutcome};
use crate::retry::{AttemptVerdict, EscalationDecision, RetryEscalationPolicy};

const DEFAULT_FAILURE_REASON: &str = "minimum attempts reached without contact";

/// Work produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEffect {
    /// A step became active and must be performed by `due_at`.
    StepDue {
        index: usize,
        step: Step,
        due_at: DateTime<Utc>,
    },
    RetryReminder { counted: u32, required: u32 },
    Escalated {
        action: PostFailureAction,
        reason: String,
    },
    Paused {
        reason: PauseReason,
        until: Option<DateTime<Utc>>,
    },
    Resumed { index: usize },
    Moved { target: MoveTarget },
    Completed { reason: CompletionReason },
}

pub type SchedulerEffects = Vec<SchedulerEffect>;

/// What the attempt gate allows once a step's time is up.
enum Gate {
    Hold { counted: u32, required: u32 },
    Pass,
    Escalate(PostFailureAction),
}

/// Drives instances of one cadence definition.
#[derive(Debug, Clone, Copy)]
pub struct CadenceScheduler<'a> {
    cadence: &'a Cadence,
}

impl<'a> CadenceScheduler<'a> {
    pub fn new(cadence: &'a Cadence) -> Self {
        Self { cadence }
    }

    pub fn cadence(&self) -> &Cadence {
        self.cadence
    }

    fn retry(&self) -> RetryEscalationPolicy<'a> {
        RetryEscalationPolicy::new(&self.cadence.attempts)
    }

    /// Create an instance for `lead_id` positioned at the first active step.
    pub fn start(&self, lead_id: LeadId, now: DateTime<Utc>) -> (CadenceInstance, SchedulerEffects) {
        let mut instance = CadenceInstance::new(lead_id, self.cadence.id.clone(), now);
        let mut effects = Vec::new();
        self.activate_from(&mut instance, 0, now, &mut effects);
        info!(
            instance_id = %instance.id,
            lead_id = %instance.lead_id,
            cadence_id = %self.cadence.id,
            state = %instance.state,
            "cadence started"
        );
        (instance, effects)
    }

    /// Earliest moment [`advance_if_due`](Self::advance_if_due) can act.
    pub fn next_due_at(&self, instance: &CadenceInstance) -> Option<DateTime<Utc>> {
        match &instance.state {
            InstanceState::NotStarted => Some(instance.created_at),
            InstanceState::StepActive {
                index,
                activated_at,
            } => Some(*activated_at + self.deadline(*index)),
            InstanceState::WaitingForAttempt {
                index,
                waiting_since,
                last_reminder_at,
                ..
            } => self
                .reminder_interval(*index)
                .map(|every| last_reminder_at.unwrap_or(*waiting_since) + every),
            InstanceState::Paused {
                reason: PauseReason::UntilVisitDate,
                until,
                ..
            } => *until,
            _ => None,
        }
    }

    /// Act on elapsed deadlines, reminders, and visit dates.
    pub fn advance_if_due(&self, instance: &mut CadenceInstance, now: DateTime<Utc>) -> SchedulerEffects {
        let mut effects = Vec::new();
        match instance.state.clone() {
            InstanceState::NotStarted => self.activate_from(instance, 0, now, &mut effects),
            InstanceState::StepActive {
                index,
                activated_at,
            } => {
                if now < activated_at + self.deadline(index) {
                    return effects;
                }
                match self.gate(instance, now) {
                    Gate::Pass => self.activate_from(instance, index + 1, now, &mut effects),
                    Gate::Escalate(action) => {
                        self.escalate(instance, action, index, now, &mut effects)
                    }
                    Gate::Hold { counted, required } => {
                        instance.transition(
                            InstanceState::WaitingForAttempt {
                                index,
                                activated_at,
                                waiting_since: now,
                                last_reminder_at: Some(now),
                            },
                            now,
                        );
                        effects.push(SchedulerEffect::RetryReminder { counted, required });
                    }
                }
            }
            InstanceState::WaitingForAttempt {
                index,
                activated_at,
                waiting_since,
                last_reminder_at,
            } => match self.gate(instance, now) {
                Gate::Pass => self.activate_from(instance, index + 1, now, &mut effects),
                Gate::Escalate(action) => self.escalate(instance, action, index, now, &mut effects),
                Gate::Hold { counted, required } => {
                    let due = self
                        .reminder_interval(index)
                        .map(|every| last_reminder_at.unwrap_or(waiting_since) + every);
                    if due.is_some_and(|due| now >= due) {
                        instance.transition(
                            InstanceState::WaitingForAttempt {
                                index,
                                activated_at,
                                waiting_since,
                                last_reminder_at: Some(now),
                            },
                            now,
                        );
                        effects.push(SchedulerEffect::RetryReminder { counted, required });
                    }
                }
            },
            InstanceState::Paused {
                reason: PauseReason::UntilVisitDate,
                until: Some(until),
                resume_index,
                ..
            } if now >= until => {
                debug!(instance_id = %instance.id, "visit date reached, resuming");
                effects.push(SchedulerEffect::Resumed {
                    index: resume_index,
                });
                self.activate_from(instance, resume_index, now, &mut effects);
            }
            _ => {}
        }
        effects
    }

    /// Record a contact attempt.
    ///
    /// While waiting for attempts, crossing the threshold escalates and a
    /// satisfied expectation advances to the next step.
    pub fn record_attempt(
        &self,
        instance: &mut CadenceInstance,
        channel: Channel,
        result: AttemptResult,
        now: DateTime<Utc>,
    ) -> Result<(AttemptVerdict, SchedulerEffects), LeadflowError> {
        if matches!(
            instance.state,
            InstanceState::Completed { .. } | InstanceState::Moved { .. }
        ) {
            return Err(LeadflowError::InvalidTransition {
                from: instance.state.to_string(),
                operation: "record an attempt on",
            });
        }

        let verdict = self.retry().record_attempt(instance, channel, result, now);
        instance.updated_at = now;

        let mut effects = Vec::new();
        if let InstanceState::WaitingForAttempt { index, .. } = instance.state {
            match self.gate(instance, now) {
                Gate::Pass => self.activate_from(instance, index + 1, now, &mut effects),
                Gate::Escalate(action) => self.escalate(instance, action, index, now, &mut effects),
                Gate::Hold { .. } => {}
            }
        }
        Ok((verdict, effects))
    }

    /// Route recorded outcome flags through the cadence's outcome rules.
    ///
    /// Returns `None` when no flag is set. A `continue` rule is reported but
    /// leaves the instance untouched.
    pub fn apply_outcome(
        &self,
        instance: &mut CadenceInstance,
        flags: &OutcomeFlags,
        now: DateTime<Utc>,
    ) -> Result<(Option<RoutedOutcome>, SchedulerEffects), LeadflowError> {
        if !instance.accepts_outcomes() {
            return Err(LeadflowError::InvalidTransition {
                from: instance.state.to_string(),
                operation: "apply an outcome to",
            });
        }
        let Some(routed) = OutcomeRouter::route(flags, &self.cadence.outcomes) else {
            return Ok((None, Vec::new()));
        };

        let mut effects = Vec::new();
        let resume_index = self.resume_index(instance);
        match &routed.action {
            OutcomeAction::Continue => {}
            OutcomeAction::End => self.complete(instance, CompletionReason::OutcomeEnd, now, &mut effects),
            OutcomeAction::PauseUntilVisit => {
                self.pause(instance, PauseReason::UntilVisit, None, resume_index, now, &mut effects)
            }
            OutcomeAction::PauseUntilVisitDate => self.pause(
                instance,
                PauseReason::UntilVisitDate,
                flags.visit_at,
                resume_index,
                now,
                &mut effects,
            ),
            OutcomeAction::MoveToCadence { cadence_id } => self.move_to(
                instance,
                MoveTarget::Cadence {
                    cadence_id: cadence_id.clone(),
                },
                now,
                &mut effects,
            ),
            OutcomeAction::MoveToPostSale { offset_days } => self.move_to(
                instance,
                MoveTarget::PostSale {
                    offset_days: *offset_days,
                },
                now,
                &mut effects,
            ),
            OutcomeAction::MoveToPrimaryQueue => {
                self.move_to(instance, MoveTarget::PrimaryQueue, now, &mut effects)
            }
        }
        info!(
            instance_id = %instance.id,
            outcome = %routed.kind,
            state = %instance.state,
            "outcome applied"
        );
        Ok((Some(routed), effects))
    }

    /// Leave a pause, re-entering the paused step with a fresh deadline.
    pub fn resume(
        &self,
        instance: &mut CadenceInstance,
        now: DateTime<Utc>,
    ) -> Result<SchedulerEffects, LeadflowError> {
        let InstanceState::Paused { resume_index, .. } = instance.state else {
            return Err(LeadflowError::InvalidTransition {
                from: instance.state.to_string(),
                operation: "resume",
            });
        };
        let mut effects = vec![SchedulerEffect::Resumed {
            index: resume_index,
        }];
        self.activate_from(instance, resume_index, now, &mut effects);
        Ok(effects)
    }

    /// Reset attempt counters and the escalation latch, then re-enter the
    /// first active step.
    pub fn restart(&self, instance: &mut CadenceInstance, now: DateTime<Utc>) -> SchedulerEffects {
        self.retry().reset(instance);
        let mut effects = Vec::new();
        self.activate_from(instance, 0, now, &mut effects);
        info!(instance_id = %instance.id, state = %instance.state, "cadence restarted");
        effects
    }

    /// Evaluate the attempt threshold outside the deadline path.
    ///
    /// A fired escalation moves a running instance past its current step;
    /// a paused or unstarted one stays where it is unless the action
    /// discards the lead. Surfaces
    /// [`LeadflowError::EscalationAlreadyHandled`] once the latch has fired.
    pub fn check_escalation(
        &self,
        instance: &mut CadenceInstance,
        now: DateTime<Utc>,
    ) -> Result<(EscalationDecision, SchedulerEffects), LeadflowError> {
        if matches!(
            instance.state,
            InstanceState::Completed { .. } | InstanceState::Moved { .. }
        ) {
            return Err(LeadflowError::InvalidTransition {
                from: instance.state.to_string(),
                operation: "escalate",
            });
        }
        let decision = self.retry().check_threshold(instance, now)?;
        let mut effects = Vec::new();
        if let EscalationDecision::Escalate(action) = decision {
            match instance.state {
                InstanceState::StepActive { index, .. }
                | InstanceState::WaitingForAttempt { index, .. } => {
                    self.escalate(instance, action, index, now, &mut effects)
                }
                _ => {
                    effects.push(SchedulerEffect::Escalated {
                        action,
                        reason: self.failure_reason(),
                    });
                    if action == PostFailureAction::Discard {
                        self.complete(instance, CompletionReason::Discarded, now, &mut effects);
                    }
                }
            }
        }
        Ok((decision, effects))
    }

    fn gate(&self, instance: &mut CadenceInstance, now: DateTime<Utc>) -> Gate {
        match self.retry().check_threshold(instance, now) {
            Ok(EscalationDecision::Pending { counted, required }) => Gate::Hold { counted, required },
            Ok(EscalationDecision::Escalate(action)) => Gate::Escalate(action),
            Ok(EscalationDecision::NotRequired | EscalationDecision::Satisfied) => Gate::Pass,
            Err(err) => {
                // Only the already-handled guard can surface here.
                debug!(instance_id = %instance.id, error = %err, "escalation latched");
                Gate::Pass
            }
        }
    }

    fn deadline(&self, index: usize) -> Duration {
        self.cadence
            .step(index)
            .map(|step| step.deadline.to_chrono())
            .unwrap_or_else(Duration::zero)
    }

    /// Spacing of retry reminders: the attempt interval, else the step
    /// deadline. `None` when both are zero.
    fn reminder_interval(&self, index: usize) -> Option<Duration> {
        let interval = &self.cadence.attempts.interval_between_attempts;
        if !interval.is_zero() {
            return Some(interval.to_chrono());
        }
        self.cadence
            .step(index)
            .filter(|step| !step.deadline.is_zero())
            .map(|step| step.deadline.to_chrono())
    }

    fn resume_index(&self, instance: &CadenceInstance) -> usize {
        match instance.state {
            InstanceState::NotStarted => 0,
            InstanceState::StepActive { index, .. }
            | InstanceState::WaitingForAttempt { index, .. } => index,
            InstanceState::Paused { resume_index, .. } => resume_index,
            InstanceState::Completed { .. } | InstanceState::Moved { .. } => self.cadence.steps.len(),
        }
    }

    fn activate_from(
        &self,
        instance: &mut CadenceInstance,
        from: usize,
        now: DateTime<Utc>,
        effects: &mut SchedulerEffects,
    ) {
        let Some(index) = self.cadence.next_active_step(from) else {
            self.complete(instance, CompletionReason::EndOfSteps, now, effects);
            return;
        };
        let Some(step) = self.cadence.step(index) else {
            self.complete(instance, CompletionReason::EndOfSteps, now, effects);
            return;
        };
        instance.transition(
            InstanceState::StepActive {
                index,
                activated_at: now,
            },
            now,
        );
        debug!(instance_id = %instance.id, step_id = %step.id, index, "step activated");
        effects.push(SchedulerEffect::StepDue {
            index,
            step: step.clone(),
            due_at: now + step.deadline.to_chrono(),
        });
    }

    fn escalate(
        &self,
        instance: &mut CadenceInstance,
        action: PostFailureAction,
        index: usize,
        now: DateTime<Utc>,
        effects: &mut SchedulerEffects,
    ) {
        effects.push(SchedulerEffect::Escalated {
            action,
            reason: self.failure_reason(),
        });
        match action {
            PostFailureAction::Discard => {
                self.complete(instance, CompletionReason::Discarded, now, effects)
            }
            PostFailureAction::Redistribute | PostFailureAction::CreateManagerTask => {
                self.activate_from(instance, index + 1, now, effects)
            }
        }
    }

    fn failure_reason(&self) -> String {
        self.cadence
            .attempts
            .failure_reason
            .clone()
            .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string())
    }

    fn complete(
        &self,
        instance: &mut CadenceInstance,
        reason: CompletionReason,
        now: DateTime<Utc>,
        effects: &mut SchedulerEffects,
    ) {
        instance.transition(InstanceState::Completed { reason, at: now }, now);
        effects.push(SchedulerEffect::Completed { reason });
    }

    fn pause(
        &self,
        instance: &mut CadenceInstance,
        reason: PauseReason,
        until: Option<DateTime<Utc>>,
        resume_index: usize,
        now: DateTime<Utc>,
        effects: &mut SchedulerEffects,
    ) {
        instance.transition(
            InstanceState::Paused {
                reason,
                since: now,
                resume_index,
                until,
            },
            now,
        );
        effects.push(SchedulerEffect::Paused { reason, until });
    }

    fn move_to(
        &self,
        instance: &mut CadenceInstance,
        target: MoveTarget,
        now: DateTime<Utc>,
        effects: &mut SchedulerEffects,
    ) {
        instance.transition(
            InstanceState::Moved {
                target: target.clone(),
                at: now,
            },
            now,
        );
        effects.push(SchedulerEffect::Moved { target });
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::DurationSpec;
    use leadflow_core::model::CadenceTrigger;

    use super::*;

    #[test]
    fn cadence_without_active_steps_completes_on_start() {
        let cadence = Cadence::new("c1", "Vazia", CadenceTrigger::NewLead)
            .with_step(Step::new("s1", Channel::Email, DurationSpec::hours(1)).inactive());
        let (instance, effects) = CadenceScheduler::new(&cadence).start("lead-1".into(), Utc::now());
        assert!(matches!(
            instance.state,
            InstanceState::Completed {
                reason: CompletionReason::EndOfSteps,
                ..
            }
        ));
        assert_eq!(
            effects,
            vec![SchedulerEffect::Completed {
                reason: CompletionReason::EndOfSteps
            }]
        );
        // End-of-steps completion still accepts outcomes.
        assert!(instance.accepts_outcomes());
    }

    #[test]
    fn next_due_at_follows_the_active_step_deadline() {
        let cadence = Cadence::new("c1", "Uma etapa", CadenceTrigger::NewLead)
            .with_step(Step::new("s1", Channel::Call, DurationSpec::hours(2)));
        let scheduler = CadenceScheduler::new(&cadence);
        let now = Utc::now();
        let (instance, _) = scheduler.start("lead-1".into(), now);
        assert_eq!(scheduler.next_due_at(&instance), Some(now + Duration::hours(2)));
    }

    #[test]
    fn explicit_escalation_check_fires_once() {
        let cadence = Cadence::new("c1", "Duas etapas", CadenceTrigger::NewLead)
            .with_step(Step::new("s1", Channel::Whatsapp, DurationSpec::hours(2)))
            .with_step(Step::new("s2", Channel::Call, DurationSpec::hours(2)))
            .with_attempts(leadflow_core::model::AttemptPolicy {
                minimum_required_attempts: 1,
                post_failure_action: PostFailureAction::CreateManagerTask,
                ..Default::default()
            });
        let scheduler = CadenceScheduler::new(&cadence);
        let now = Utc::now();
        let (mut instance, _) = scheduler.start("lead-1".into(), now);

        let (decision, effects) = scheduler.check_escalation(&mut instance, now).unwrap();
        assert_eq!(
            decision,
            EscalationDecision::Pending {
                counted: 0,
                required: 1
            }
        );
        assert!(effects.is_empty());

        scheduler
            .record_attempt(&mut instance, Channel::Whatsapp, AttemptResult::NoAnswer, now)
            .unwrap();
        let (decision, effects) = scheduler.check_escalation(&mut instance, now).unwrap();
        assert_eq!(
            decision,
            EscalationDecision::Escalate(PostFailureAction::CreateManagerTask)
        );
        assert!(matches!(effects.last(), Some(SchedulerEffect::StepDue { index: 1, .. })));

        let err = scheduler.check_escalation(&mut instance, now).unwrap_err();
        assert!(err.is_benign());
    }
}
