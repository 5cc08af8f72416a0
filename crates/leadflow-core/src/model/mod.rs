// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model: queues, rules, cadences, instances, lead assignments, and
//! audit records.

pub mod audit;
pub mod cadence;
pub mod instance;
pub mod lead;
pub mod queue;
pub mod rule;

pub use audit::{
    AuditDimension, AuditFilter, LeadIdentity, OperationType, RedistributionHistoryItem,
    Responsible, TimeBucket,
};
pub use cadence::{
    AttemptPolicy, Cadence, CadenceTrigger, ExpectedOutcome, OutcomeAction, OutcomeRules,
    PostFailureAction, Step, StepOwner,
};
pub use instance::{
    AttemptResult, CadenceInstance, CompletionReason, EscalationState, InstanceState,
    InstanceStatus, MoveTarget, PauseReason,
};
pub use lead::{LeadState, PendingRedistribution};
pub use queue::{AdvancedConfig, AvailabilityWindow, CheckInPolicy, Queue, QueueMember, QueueType};
pub use rule::{FieldKind, Rule, RuleField, RuleOperator, RuleValue};
