// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Definition validation run by callers before storing queues and cadences.
//!
//! Every check runs and all problems are reported together, so an operator
//! fixing a definition file sees the full list at once.

use std::collections::HashSet;

use crate::error::LeadflowError;
use crate::model::cadence::{Cadence, CadenceTrigger, OutcomeAction};
use crate::model::queue::Queue;
use crate::model::rule::{Rule, RuleOperator, RuleValue};

fn check_rules(owner: &str, rules: &[Rule], errors: &mut Vec<String>) {
    if rules.is_empty() {
        errors.push(format!("{owner}: at least one rule is required"));
    }
    for rule in rules {
        if rule.field.key().trim().is_empty() {
            errors.push(format!("{owner}: rule {} has an empty field", rule.id));
        }
        if rule.operator.is_numeric() {
            let numeric = match &rule.value {
                RuleValue::Number(n) => n.is_finite(),
                RuleValue::Text(text) => text.trim().replace(',', ".").parse::<f64>().is_ok(),
                RuleValue::List(_) => false,
            };
            if !numeric {
                errors.push(format!(
                    "{owner}: rule {} uses {} with a non-numeric value",
                    rule.id, rule.operator
                ));
            }
        }
        if matches!(rule.operator, RuleOperator::In | RuleOperator::NotIn) {
            if let RuleValue::List(items) = &rule.value {
                if items.is_empty() {
                    errors.push(format!("{owner}: rule {} has an empty list", rule.id));
                }
            }
        }
    }
}

pub fn queue_errors(queue: &Queue) -> Vec<String> {
    let owner = format!("queue {}", queue.id);
    let mut errors = Vec::new();
    if queue.id.as_str().trim().is_empty() {
        errors.push("queue id must not be empty".to_string());
    }
    if queue.name.trim().is_empty() {
        errors.push(format!("{owner}: name must not be empty"));
    }
    check_rules(&owner, &queue.rules, &mut errors);

    let mut seen = HashSet::new();
    for member in &queue.members {
        if !seen.insert(&member.user_id) {
            errors.push(format!("{owner}: member {} listed twice", member.user_id));
        }
    }
    if let Some(cursor) = &queue.next_member_id {
        if !queue.member(cursor).is_some_and(|m| m.active) {
            errors.push(format!(
                "{owner}: rotation cursor {cursor} is not an active member"
            ));
        }
    }
    if queue.advanced.overflow_queue_id.as_ref() == Some(&queue.id) {
        errors.push(format!("{owner}: overflow queue must differ from the queue itself"));
    }
    if queue.advanced.max_concurrent_leads == Some(0) {
        errors.push(format!("{owner}: maxConcurrentLeads must be at least 1"));
    }
    let windows = queue
        .check_in
        .windows
        .iter()
        .chain(queue.members.iter().flat_map(|m| m.availability.iter()));
    for window in windows {
        if window.start == window.end {
            errors.push(format!("{owner}: availability window starts and ends at {}", window.start));
        }
        if window.days.is_empty() {
            errors.push(format!("{owner}: availability window has no days"));
        }
    }
    if queue.check_in.required
        && queue.check_in.windows.is_empty()
        && queue.members.iter().all(|m| m.availability.is_empty())
    {
        errors.push(format!(
            "{owner}: check-in is required but no availability window is configured"
        ));
    }
    if !(-14 * 60..=14 * 60).contains(&queue.check_in.utc_offset_minutes) {
        errors.push(format!(
            "{owner}: utcOffsetMinutes {} is outside -840..=840",
            queue.check_in.utc_offset_minutes
        ));
    }
    errors
}

pub fn cadence_errors(cadence: &Cadence) -> Vec<String> {
    let owner = format!("cadence {}", cadence.id);
    let mut errors = Vec::new();
    if cadence.id.as_str().trim().is_empty() {
        errors.push("cadence id must not be empty".to_string());
    }
    if cadence.name.trim().is_empty() {
        errors.push(format!("{owner}: name must not be empty"));
    }
    check_rules(&owner, &cadence.entry_rules, &mut errors);

    match &cadence.trigger {
        CadenceTrigger::NoResponse { hours: 0 } => {
            errors.push(format!("{owner}: no-response trigger needs hours > 0"));
        }
        CadenceTrigger::Inactivity { days: 0 } => {
            errors.push(format!("{owner}: inactivity trigger needs days > 0"));
        }
        CadenceTrigger::PostSale { day_offsets } if day_offsets.is_empty() => {
            errors.push(format!("{owner}: post-sale trigger needs at least one day offset"));
        }
        _ => {}
    }

    if cadence.steps.is_empty() {
        errors.push(format!("{owner}: at least one step is required"));
    }
    let mut seen = HashSet::new();
    for step in &cadence.steps {
        if !seen.insert(&step.id) {
            errors.push(format!("{owner}: step {} listed twice", step.id));
        }
        if step.name.trim().is_empty() {
            errors.push(format!("{owner}: step {} has an empty name", step.id));
        }
    }

    let attempts = &cadence.attempts;
    if attempts.is_required() {
        let usable = cadence
            .steps
            .iter()
            .filter(|s| s.active)
            .any(|s| attempts.counts_channel(s.channel));
        if !usable {
            errors.push(format!(
                "{owner}: no active step uses a channel allowed to count attempts"
            ));
        }
    }
    if attempts.failure_reason.as_deref().is_some_and(|r| r.trim().is_empty()) {
        errors.push(format!("{owner}: failure reason must not be blank when set"));
    }

    for action in [
        &cadence.outcomes.on_responded,
        &cadence.outcomes.on_visit_scheduled,
        &cadence.outcomes.on_deal_closed,
    ] {
        if let OutcomeAction::MoveToCadence { cadence_id } = action {
            if cadence_id == &cadence.id {
                errors.push(format!("{owner}: outcome moves the lead into the same cadence"));
            }
        }
    }
    errors
}

pub fn validate_queue(queue: &Queue) -> Result<(), LeadflowError> {
    into_result(queue_errors(queue))
}

pub fn validate_cadence(cadence: &Cadence) -> Result<(), LeadflowError> {
    into_result(cadence_errors(cadence))
}

/// Validate a whole definition set, including cross references.
pub fn validate_definitions(queues: &[Queue], cadences: &[Cadence]) -> Result<(), LeadflowError> {
    let mut errors: Vec<String> = queues.iter().flat_map(queue_errors).collect();
    errors.extend(cadences.iter().flat_map(cadence_errors));

    let mut queue_ids = HashSet::new();
    for queue in queues {
        if !queue_ids.insert(&queue.id) {
            errors.push(format!("queue id {} is used twice", queue.id));
        }
    }
    let mut cadence_ids = HashSet::new();
    for cadence in cadences {
        if !cadence_ids.insert(&cadence.id) {
            errors.push(format!("cadence id {} is used twice", cadence.id));
        }
    }
    for queue in queues {
        if let Some(overflow) = &queue.advanced.overflow_queue_id {
            if !queue_ids.contains(overflow) {
                errors.push(format!(
                    "queue {}: overflow queue {overflow} does not exist",
                    queue.id
                ));
            }
        }
    }
    if queues.iter().filter(|q| q.advanced.primary).count() > 1 {
        errors.push("more than one queue is marked primary".to_string());
    }
    for cadence in cadences {
        for action in [
            &cadence.outcomes.on_responded,
            &cadence.outcomes.on_visit_scheduled,
            &cadence.outcomes.on_deal_closed,
        ] {
            if let OutcomeAction::MoveToCadence { cadence_id } = action {
                if !cadence_ids.contains(cadence_id) {
                    errors.push(format!(
                        "cadence {}: target cadence {cadence_id} does not exist",
                        cadence.id
                    ));
                }
            }
        }
    }
    into_result(errors)
}

fn into_result(errors: Vec<String>) -> Result<(), LeadflowError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(LeadflowError::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::DurationSpec;
    use crate::model::cadence::{AttemptPolicy, OutcomeRules, Step};
    use crate::model::queue::QueueMember;
    use crate::model::rule::RuleField;
    use crate::types::Channel;

    fn site_rule() -> Rule {
        Rule::new(RuleField::Origem, RuleOperator::Equals, "Site")
    }

    fn queue() -> Queue {
        Queue::new("q1", "Site")
            .with_rule(site_rule())
            .with_member(QueueMember::new("ana"))
    }

    fn cadence() -> Cadence {
        Cadence::new("c1", "Boas-vindas", CadenceTrigger::NewLead)
            .with_entry_rule(site_rule())
            .with_step(Step::new("s1", Channel::Whatsapp, DurationSpec::hours(1)))
    }

    #[test]
    fn valid_definitions_pass() {
        assert!(validate_queue(&queue()).is_ok());
        assert!(validate_cadence(&cadence()).is_ok());
        assert!(validate_definitions(&[queue()], &[cadence()]).is_ok());
    }

    #[test]
    fn collects_every_queue_problem() {
        let mut bad = Queue::new("q1", "  ")
            .with_member(QueueMember::new("ana"))
            .with_member(QueueMember::new("ana"));
        bad.advanced.overflow_queue_id = Some("q1".into());
        let Err(LeadflowError::Validation(errors)) = validate_queue(&bad) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("at least one rule")));
    }

    #[test]
    fn numeric_operator_needs_numeric_value() {
        let q = Queue::new("q1", "Alto padrão")
            .with_rule(Rule::new(RuleField::Valor, RuleOperator::GreaterThan, "muito"));
        let errors = queue_errors(&q);
        assert!(errors.iter().any(|e| e.contains("non-numeric")));
        let q = Queue::new("q1", "Alto padrão")
            .with_rule(Rule::new(RuleField::Valor, RuleOperator::GreaterThan, "500000,00"));
        assert!(queue_errors(&q).is_empty());
    }

    #[test]
    fn attempts_need_a_countable_step() {
        let c = cadence().with_attempts(AttemptPolicy {
            minimum_required_attempts: 2,
            allowed_channels: vec![Channel::Email],
            ..AttemptPolicy::default()
        });
        let errors = cadence_errors(&c);
        assert!(errors.iter().any(|e| e.contains("allowed to count")));
    }

    #[test]
    fn cross_references_are_checked() {
        let mut q = queue();
        q.advanced.overflow_queue_id = Some("missing".into());
        let c = cadence().with_outcomes(OutcomeRules {
            on_responded: OutcomeAction::MoveToCadence {
                cadence_id: "nowhere".into(),
            },
            ..OutcomeRules::default()
        });
        let Err(LeadflowError::Validation(errors)) = validate_definitions(&[q], &[c]) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 2, "{errors:?}");
    }

    #[test]
    fn duplicate_step_ids_rejected() {
        let c = cadence().with_step(Step::new("s1", Channel::Call, DurationSpec::hours(2)));
        assert!(cadence_errors(&c).iter().any(|e| e.contains("listed twice")));
    }
}
