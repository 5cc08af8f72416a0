// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Leadflow distribution engine.
//!
//! This crate provides the domain model, the error taxonomy, relative
//! duration specs, definition validation, and the repository and
//! collaborator traits implemented elsewhere in the workspace.

pub mod duration;
pub mod error;
pub mod model;
pub mod traits;
pub mod types;
pub mod validation;

pub use duration::{DurationParseError, DurationSpec};
pub use error::LeadflowError;
pub use types::{
    AgentId, CadenceId, Channel, InstanceId, LeadEvent, LeadEventKind, LeadId, LeadRecord,
    QueueId, RuleId, StepId,
};

pub use traits::{
    Assignment, AuditStore, CadenceStore, Collaborators, InstanceStore, LeadStore, ManagerTask,
    QueueStore, RetryReminder, StepDispatch, Storage, Stores,
};
