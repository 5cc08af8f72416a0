// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule evaluation for queue routing and cadence entry.
//!
//! Pure functions over a lead record: no I/O, no interior mutability, never
//! panics on malformed input. A rule whose field is missing or whose values
//! cannot be compared evaluates to false.

pub mod coerce;
pub mod engine;

pub use engine::{RuleEngine, RuleOutcome, Verdict};
