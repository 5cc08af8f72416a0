// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the engine and the outside world.
//!
//! Repositories persist definitions, instances, lead assignments and audit
//! records. Collaborators perform side effects such as outreach and queue
//! moves.
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod collaborators;
pub mod storage;

pub use collaborators::{
    Assignment, Collaborators, ManagerTask, RetryReminder, StepDispatch,
};
pub use storage::{
    AuditStore, CadenceStore, InstanceStore, LeadStore, QueueStore, Storage, Stores,
};
