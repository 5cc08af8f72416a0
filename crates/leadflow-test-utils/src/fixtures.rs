// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical definitions and leads shared by integration tests.

use chrono::{DateTime, TimeZone, Utc};
use leadflow_core::model::{
    AttemptPolicy, Cadence, CadenceTrigger, PostFailureAction, Queue, QueueMember, Rule,
    RuleOperator, Step,
};
use leadflow_core::{Channel, DurationSpec, LeadEvent, LeadEventKind, LeadRecord};
use serde_json::json;

pub const SITE_QUEUE: &str = "site";
pub const BACKUP_QUEUE: &str = "plantao";
pub const WELCOME_CADENCE: &str = "boas-vindas";

/// A fixed Monday morning, so availability windows are deterministic.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn origin_is(origin: &str) -> Rule {
    Rule::new("origem", RuleOperator::Equals, origin)
}

/// Queue for site leads: `ana`, `bruno`, and the inactive `carla`.
pub fn site_queue() -> Queue {
    let mut queue = Queue::new(SITE_QUEUE, "Leads do site")
        .with_rule(origin_is("Site"))
        .with_member(QueueMember::new("ana"))
        .with_member(QueueMember::new("bruno"))
        .with_member(QueueMember::new("carla").inactive());
    queue.position = 1;
    queue.advanced.primary = true;
    queue
}

/// Duty queue for portal and referral leads with a single broker.
pub fn backup_queue() -> Queue {
    let mut queue = Queue::new(BACKUP_QUEUE, "Plantão")
        .with_rule(Rule::new(
            "origem",
            RuleOperator::In,
            vec!["Portal", "Indicação"],
        ))
        .with_member(QueueMember::new("diego"));
    queue.position = 9;
    queue
}

/// New-lead cadence for site leads that needs `minimum` WhatsApp or call
/// attempts before `action` fires.
pub fn welcome_cadence(minimum: u32, action: PostFailureAction) -> Cadence {
    Cadence::new(WELCOME_CADENCE, "Boas-vindas", CadenceTrigger::NewLead)
        .with_entry_rule(origin_is("Site"))
        .with_step(Step::new("whats", Channel::Whatsapp, DurationSpec::hours(1)))
        .with_step(Step::new("ligar", Channel::Call, DurationSpec::hours(24)))
        .with_step(Step::new("email", Channel::Email, DurationSpec::days(2)))
        .with_attempts(AttemptPolicy {
            minimum_required_attempts: minimum,
            allowed_channels: vec![Channel::Whatsapp, Channel::Call],
            post_failure_action: action,
            ..AttemptPolicy::default()
        })
}

pub fn record(origin: &str) -> LeadRecord {
    LeadRecord::new()
        .with("origem", origin)
        .with("nome", "Lead de teste")
        .with("etapa", "Novo")
        .with("valor", json!(450000))
}

/// A `created` event for `lead_id` at [`t0`].
pub fn new_lead(lead_id: &str, origin: &str) -> LeadEvent {
    LeadEvent::new(lead_id, LeadEventKind::Created, record(origin)).at(t0())
}
