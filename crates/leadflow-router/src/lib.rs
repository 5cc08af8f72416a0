// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead-to-broker assignment.
//!
//! [`QueueAssignor`] is the pure round-robin selection over a queue value.
//! [`AssignmentService`] wraps it with per-queue serialization, optimistic
//! persistence, and a single overflow hop.

pub mod assignor;
pub mod metrics;
pub mod service;

pub use assignor::QueueAssignor;
pub use service::{AssignmentOutcome, AssignmentRecorder, AssignmentService, NoopRecorder};
