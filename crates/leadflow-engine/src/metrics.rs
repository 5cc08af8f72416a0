// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine metrics, recorded through the metrics-rs facade.

use leadflow_core::model::PostFailureAction;
use metrics::describe_counter;

/// Register metric descriptions, including the assignment service's.
pub fn register_metrics() {
    leadflow_router::metrics::register_metrics();
    describe_counter!("leadflow_leads_total", "Lead events by distribution result");
    describe_counter!("leadflow_cadences_started_total", "Cadence instances started");
    describe_counter!("leadflow_escalations_total", "Escalations fired by action");
    describe_counter!(
        "leadflow_dispatch_failures_total",
        "Collaborator calls that returned an error"
    );
    describe_counter!(
        "leadflow_tick_failures_total",
        "Instances that failed to advance during a tick"
    );
}

pub(crate) fn record_lead(result: &'static str) {
    metrics::counter!("leadflow_leads_total", "result" => result).increment(1);
}

pub(crate) fn record_cadence_started(cadence_id: &str) {
    metrics::counter!("leadflow_cadences_started_total", "cadence" => cadence_id.to_string())
        .increment(1);
}

pub(crate) fn record_escalation(action: PostFailureAction) {
    let action = match action {
        PostFailureAction::Discard => "discard",
        PostFailureAction::Redistribute => "redistribute",
        PostFailureAction::CreateManagerTask => "create-manager-task",
    };
    metrics::counter!("leadflow_escalations_total", "action" => action).increment(1);
}

pub(crate) fn record_dispatch_failure(call: &'static str) {
    metrics::counter!("leadflow_dispatch_failures_total", "call" => call).increment(1);
}

pub(crate) fn record_tick_failures(count: usize) {
    metrics::counter!("leadflow_tick_failures_total").increment(count as u64);
}
