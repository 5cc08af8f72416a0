// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Leadflow engine.

use thiserror::Error;

/// The primary error type shared by every Leadflow crate.
#[derive(Debug, Error)]
pub enum LeadflowError {
    /// Malformed queue or cadence definition (empty name, no rules, duplicate ids).
    ///
    /// Raised by the validation layer before a definition reaches the engine.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The queue has no active, in-window member with spare capacity.
    ///
    /// The lead stays unassigned and is retried on the next eligible event.
    #[error("no eligible agent in queue {queue_id}")]
    NoEligibleAgent { queue_id: String },

    /// Escalation for this cadence instance already fired.
    ///
    /// This is an idempotency guard, not a failure: see [`LeadflowError::is_benign`].
    #[error("escalation already handled for cadence instance {instance_id}")]
    EscalationAlreadyHandled { instance_id: String },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An optimistic write lost against a concurrent writer.
    #[error("concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// A scheduler command is not valid in the instance's current state.
    #[error("cannot {operation} a cadence instance that is {from}")]
    InvalidTransition { from: String, operation: &'static str },

    /// Configuration errors (invalid TOML, unknown keys, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// A side-effecting collaborator (task service, outreach channel) failed.
    #[error("collaborator error: {message}")]
    Collaborator {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LeadflowError {
    /// Wrap any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LeadflowError::Storage {
            source: Box::new(err),
        }
    }

    /// Build a single-message validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        LeadflowError::Validation(vec![message.into()])
    }

    /// Errors callers should treat as success.
    pub fn is_benign(&self) -> bool {
        matches!(self, LeadflowError::EscalationAlreadyHandled { .. })
    }

    /// Errors that must stop the current pipeline instead of being retried later.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LeadflowError::Storage { .. } | LeadflowError::Internal(_)
        )
    }
}
