// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadence entry: trigger matching followed by entry-rule evaluation.

use leadflow_core::model::{Cadence, CadenceTrigger};
use leadflow_core::types::{LeadEvent, LeadEventKind};
use leadflow_rules::RuleEngine;
use tracing::trace;

/// Whether `event` fires `cadence`'s trigger.
///
/// Threshold triggers (no-response hours, inactivity days) fire once the
/// reported value reaches the configured one.
pub fn trigger_matches(cadence: &Cadence, event: &LeadEvent) -> bool {
    match (&cadence.trigger, &event.kind) {
        (CadenceTrigger::NewLead, LeadEventKind::Created) => true,
        (CadenceTrigger::StageChanged { stages }, LeadEventKind::StageChanged { stage }) => {
            stages.is_empty() || stages.iter().any(|s| s == stage)
        }
        (CadenceTrigger::NoResponse { hours }, LeadEventKind::NoResponse { hours: elapsed }) => {
            elapsed >= hours
        }
        (CadenceTrigger::Inactivity { days }, LeadEventKind::Inactive { days: elapsed }) => {
            elapsed >= days
        }
        (
            CadenceTrigger::PostSale { day_offsets },
            LeadEventKind::PostSale { days_since_close },
        ) => day_offsets.is_empty() || day_offsets.contains(days_since_close),
        (CadenceTrigger::Manual, LeadEventKind::Manual { cadence_id }) => {
            cadence_id.as_ref().is_none_or(|id| id == &cadence.id)
        }
        _ => false,
    }
}

/// Active cadences whose trigger fires and whose entry rules all hold, in
/// definition order.
pub fn attachable_cadences<'c>(
    engine: &RuleEngine,
    cadences: &'c [Cadence],
    event: &LeadEvent,
) -> Vec<&'c Cadence> {
    cadences
        .iter()
        .filter(|cadence| cadence.active)
        .filter(|cadence| trigger_matches(cadence, event))
        .filter(|cadence| {
            let matched = engine.evaluate(&event.record, &cadence.entry_rules);
            trace!(cadence_id = %cadence.id, lead_id = %event.lead_id, matched, "entry rules");
            matched
        })
        .collect()
}
