// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestration for the Leadflow engine.
//!
//! [`Engine`] ties rule matching, queue assignment, the cadence state
//! machine, and the redistribution history to the storage traits and the
//! external [`Collaborators`](leadflow_core::Collaborators).

pub mod collaborators;
mod effects;
pub mod engine;
mod locks;
pub mod metrics;
mod recorder;
pub mod report;

pub use collaborators::LoggingCollaborators;
pub use engine::{Engine, EngineSettings, RedistributionRequest};
pub use report::{
    CommandReport, DispatchSummary, Distribution, EventReport, ImportReport, InstanceFailure,
    RedistributionReport, RoutePreview, TickReport,
};
