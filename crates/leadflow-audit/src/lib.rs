// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redistribution audit log.
//!
//! Every reassignment of a lead (distribution, redistribution, escalation,
//! overflow, manual transfer, batch) is appended as an immutable
//! [`RedistributionHistoryItem`](leadflow_core::model::RedistributionHistoryItem)
//! and can be queried by any combination of dimensions.

pub mod log;

pub use log::{DimensionCount, RedistributionAuditLog, RedistributionContext};
