// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadence automation.
//!
//! - [`entry`] decides which cadences attach to a lead event.
//! - [`scheduler`] drives a [`CadenceInstance`](leadflow_core::model::CadenceInstance)
//!   through its steps and returns the effects to dispatch.
//! - [`retry`] counts contact attempts and fires escalation at most once.
//! - [`outcome`] maps recorded outcomes to the cadence's outcome rules.
//!
//! Everything here is synchronous and free of I/O; the engine crate owns
//! persistence and effect dispatch.

pub mod entry;
pub mod outcome;
pub mod retry;
pub mod scheduler;

pub use entry::{attachable_cadences, trigger_matches};
pub use outcome::{OutcomeFlags, OutcomeKind, OutcomeRouter, RoutedOutcome};
pub use retry::{AttemptVerdict, EscalationDecision, RetryEscalationPolicy};
pub use scheduler::{CadenceScheduler, SchedulerEffect, SchedulerEffects};
