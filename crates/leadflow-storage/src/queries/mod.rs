// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table.

pub mod cadences;
pub mod history;
pub mod instances;
pub mod leads;
pub mod queues;
