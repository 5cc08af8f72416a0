// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assignment metrics, recorded through the metrics-rs facade.

use metrics::{describe_counter, describe_histogram};

/// Register metric descriptions. Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(
        "leadflow_assignments_total",
        "Assignment attempts by queue and outcome"
    );
    describe_counter!(
        "leadflow_assignment_conflicts_total",
        "Optimistic version conflicts while persisting rotation state"
    );
    describe_histogram!(
        "leadflow_assignment_retries",
        "Persist attempts needed per successful assignment"
    );
}

pub fn record_assignment(queue_id: &str, outcome: &'static str) {
    metrics::counter!("leadflow_assignments_total", "queue" => queue_id.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_conflict(queue_id: &str) {
    metrics::counter!("leadflow_assignment_conflicts_total", "queue" => queue_id.to_string())
        .increment(1);
}

pub fn record_attempts(attempts: u32) {
    metrics::histogram!("leadflow_assignment_retries").record(f64::from(attempts));
}
