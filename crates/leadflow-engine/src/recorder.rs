// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds the audit entry committed together with an assignment's rotation
//! state.

use chrono::{DateTime, Utc};
use leadflow_audit::{RedistributionAuditLog, RedistributionContext};
use leadflow_core::model::{LeadIdentity, OperationType, RedistributionHistoryItem};
use leadflow_core::{LeadId, LeadRecord};
use leadflow_router::{AssignmentOutcome, AssignmentRecorder};

/// Record keys read into audit dimensions, first present key wins.
const NAME_KEYS: &[&str] = &["name", "nome"];
const EMAIL_KEYS: &[&str] = &["email"];
const PHONE_KEYS: &[&str] = &["phone", "telefone"];
const TAG_KEYS: &[&str] = &["tag", "etiqueta"];
const PIPELINE_KEYS: &[&str] = &["pipeline", "funil"];
const STAGE_KEYS: &[&str] = &["stage", "etapa"];
const CHANNEL_KEYS: &[&str] = &["channel", "canal"];
const CAMPAIGN_KEYS: &[&str] = &["campaign", "campanha"];
const STATUS_KEYS: &[&str] = &["status"];

fn first_text(record: &LeadRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| record.text(key))
        .map(str::to_string)
}

/// Audit context for `lead_id` with the dimensions found in `record`.
pub(crate) fn context_from_record(
    lead_id: &LeadId,
    record: &LeadRecord,
    operation: OperationType,
    reason: &str,
    at: DateTime<Utc>,
) -> RedistributionContext {
    let mut lead = LeadIdentity::new(lead_id.clone());
    lead.name = first_text(record, NAME_KEYS);
    lead.email = first_text(record, EMAIL_KEYS);
    lead.phone = first_text(record, PHONE_KEYS);

    let mut context = RedistributionContext::new(lead, operation, reason, at);
    context.tag = first_text(record, TAG_KEYS);
    context.pipeline = first_text(record, PIPELINE_KEYS);
    context.stage = first_text(record, STAGE_KEYS);
    context.channel = CHANNEL_KEYS
        .iter()
        .find_map(|key| record.text(key))
        .and_then(|value| value.parse().ok());
    context.campaign = first_text(record, CAMPAIGN_KEYS);
    context.current_status = first_text(record, STATUS_KEYS);
    context
}

/// [`AssignmentRecorder`] for the redistribution history.
pub(crate) struct AuditRecorder<'a> {
    audit: &'a RedistributionAuditLog,
    template: RedistributionContext,
}

impl<'a> AuditRecorder<'a> {
    pub(crate) fn new(audit: &'a RedistributionAuditLog, template: RedistributionContext) -> Self {
        Self { audit, template }
    }
}

impl AssignmentRecorder for AuditRecorder<'_> {
    fn entry(&self, outcome: &AssignmentOutcome) -> Option<RedistributionHistoryItem> {
        let mut context = self.template.clone();
        context.broker = Some(outcome.agent_id.clone());
        context.target_queue = Some(outcome.queue_id.clone());
        if let Some(origin) = &outcome.overflowed_from {
            context.operation = OperationType::Overflow;
            context.source_queue.get_or_insert_with(|| origin.clone());
        }
        self.audit.entry(context)
    }

    fn committed(&self, entry: &RedistributionHistoryItem) {
        self.audit.appended(entry);
    }
}
