// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Leadflow integration tests.
//!
//! # Components
//!
//! - [`TestHarness`] - engine over throwaway storage with imported definitions
//! - [`RecordingCollaborators`] - collaborators that capture calls
//! - [`fixtures`] - canonical queues, cadences, and leads

pub mod fixtures;
pub mod harness;
pub mod recording;

pub use harness::TestHarness;
pub use recording::{Call, RecordingCollaborators};
