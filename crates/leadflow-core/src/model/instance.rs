// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running cadence instances: one per (lead, cadence) pair.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::model::cadence::PostFailureAction;
use crate::types::{AgentId, CadenceId, Channel, InstanceId, LeadId, QueueId};

/// Why an instance completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CompletionReason {
    /// Every active step ran. Outcome rules still apply.
    EndOfSteps,
    /// An outcome rule ended the cadence.
    OutcomeEnd,
    /// The post-failure action discarded the lead.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PauseReason {
    UntilVisit,
    UntilVisitDate,
}

/// Where a moved instance went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MoveTarget {
    #[serde(rename_all = "camelCase")]
    Cadence { cadence_id: CadenceId },
    #[serde(rename_all = "camelCase")]
    PostSale { offset_days: u32 },
    PrimaryQueue,
}

/// Scheduler state of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum InstanceState {
    NotStarted,
    #[serde(rename_all = "camelCase")]
    StepActive {
        index: usize,
        activated_at: DateTime<Utc>,
    },
    /// Deadline passed below the attempt threshold.
    #[serde(rename_all = "camelCase")]
    WaitingForAttempt {
        index: usize,
        activated_at: DateTime<Utc>,
        waiting_since: DateTime<Utc>,
        #[serde(default)]
        last_reminder_at: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        reason: CompletionReason,
        at: DateTime<Utc>,
    },
    /// `resume_index` is the step re-entered on resume.
    #[serde(rename_all = "camelCase")]
    Paused {
        reason: PauseReason,
        since: DateTime<Utc>,
        resume_index: usize,
        #[serde(default)]
        until: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    Moved {
        target: MoveTarget,
        at: DateTime<Utc>,
    },
}

impl InstanceState {
    pub fn name(&self) -> &'static str {
        match self {
            InstanceState::NotStarted => "not-started",
            InstanceState::StepActive { .. } => "step-active",
            InstanceState::WaitingForAttempt { .. } => "waiting-for-attempt",
            InstanceState::Completed { .. } => "completed",
            InstanceState::Paused { .. } => "paused",
            InstanceState::Moved { .. } => "moved",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse status shown in listings, derived from [`InstanceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InstanceStatus {
    Active,
    Paused,
    Completed,
    Moved,
}

/// Escalation latch: fires at most once until reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum EscalationState {
    #[default]
    Armed,
    Fired {
        action: PostFailureAction,
        at: DateTime<Utc>,
    },
}

/// Result reported with a contact attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AttemptResult {
    #[default]
    NoAnswer,
    ContactEstablished,
}

/// A cadence running for one lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CadenceInstance {
    pub id: InstanceId,
    pub lead_id: LeadId,
    pub cadence_id: CadenceId,
    /// Queue the lead was distributed from.
    #[serde(default)]
    pub queue_id: Option<QueueId>,
    /// Broker currently responsible for the lead.
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    pub state: InstanceState,
    /// Every recorded attempt, counted or not.
    #[serde(default)]
    pub attempts_per_channel: BTreeMap<Channel, u32>,
    #[serde(default)]
    pub counted_attempts: u32,
    #[serde(default)]
    pub contact_established: bool,
    #[serde(default)]
    pub escalation: EscalationState,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_counted_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CadenceInstance {
    pub fn new(lead_id: LeadId, cadence_id: CadenceId, now: DateTime<Utc>) -> Self {
        Self {
            id: InstanceId::generate(),
            lead_id,
            cadence_id,
            queue_id: None,
            agent_id: None,
            state: InstanceState::NotStarted,
            attempts_per_channel: BTreeMap::new(),
            counted_attempts: 0,
            contact_established: false,
            escalation: EscalationState::Armed,
            last_attempt_at: None,
            last_counted_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> InstanceStatus {
        match self.state {
            InstanceState::NotStarted
            | InstanceState::StepActive { .. }
            | InstanceState::WaitingForAttempt { .. } => InstanceStatus::Active,
            InstanceState::Paused { .. } => InstanceStatus::Paused,
            InstanceState::Completed { .. } => InstanceStatus::Completed,
            InstanceState::Moved { .. } => InstanceStatus::Moved,
        }
    }

    pub fn current_step_index(&self) -> Option<usize> {
        match self.state {
            InstanceState::StepActive { index, .. }
            | InstanceState::WaitingForAttempt { index, .. } => Some(index),
            InstanceState::Paused { resume_index, .. } => Some(resume_index),
            _ => None,
        }
    }

    /// Whether outcome rules can still act on this instance.
    pub fn accepts_outcomes(&self) -> bool {
        match &self.state {
            InstanceState::Completed { reason, .. } => *reason == CompletionReason::EndOfSteps,
            InstanceState::Moved { .. } => false,
            _ => true,
        }
    }

    /// Whether the tick loop has work to consider for this instance.
    pub fn is_schedulable(&self) -> bool {
        matches!(
            self.state,
            InstanceState::NotStarted
                | InstanceState::StepActive { .. }
                | InstanceState::WaitingForAttempt { .. }
                | InstanceState::Paused {
                    reason: PauseReason::UntilVisitDate,
                    ..
                }
        )
    }

    /// Whether this instance blocks attaching the same cadence again.
    pub fn is_open(&self) -> bool {
        matches!(
            self.status(),
            InstanceStatus::Active | InstanceStatus::Paused
        )
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts_per_channel.values().sum()
    }

    pub fn escalation_fired(&self) -> bool {
        matches!(self.escalation, EscalationState::Fired { .. })
    }

    pub fn transition(&mut self, state: InstanceState, now: DateTime<Utc>) {
        self.state = state;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance() -> CadenceInstance {
        CadenceInstance::new("lead-1".into(), "c1".into(), Utc::now())
    }

    #[test]
    fn status_is_derived_from_state() {
        let mut inst = instance();
        assert_eq!(inst.status(), InstanceStatus::Active);
        let now = Utc::now();
        inst.transition(
            InstanceState::Paused {
                reason: PauseReason::UntilVisit,
                since: now,
                resume_index: 1,
                until: None,
            },
            now,
        );
        assert_eq!(inst.status(), InstanceStatus::Paused);
        assert_eq!(inst.current_step_index(), Some(1));
        assert!(!inst.is_schedulable());
        assert!(inst.is_open());
    }

    #[test]
    fn end_of_steps_still_accepts_outcomes() {
        let mut inst = instance();
        let now = Utc::now();
        inst.transition(
            InstanceState::Completed {
                reason: CompletionReason::EndOfSteps,
                at: now,
            },
            now,
        );
        assert!(inst.accepts_outcomes());
        assert!(!inst.is_open());
        inst.transition(
            InstanceState::Completed {
                reason: CompletionReason::Discarded,
                at: now,
            },
            now,
        );
        assert!(!inst.accepts_outcomes());
    }

    #[test]
    fn state_serializes_tagged() {
        let now = Utc::now();
        let state = InstanceState::Moved {
            target: MoveTarget::PostSale { offset_days: 7 },
            at: now,
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["state"], json!("moved"));
        assert_eq!(value["target"]["kind"], json!("post-sale"));
        assert_eq!(value["target"]["offsetDays"], json!(7));
        let back: InstanceState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn per_channel_counters_sum() {
        let mut inst = instance();
        inst.attempts_per_channel.insert(Channel::Whatsapp, 2);
        inst.attempts_per_channel.insert(Channel::Call, 1);
        assert_eq!(inst.total_attempts(), 3);
        assert!(!inst.escalation_fired());
    }
}
