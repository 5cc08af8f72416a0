// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule evaluation against lead records.

use leadflow_core::LeadRecord;
use leadflow_core::model::{FieldKind, Queue, Rule, RuleOperator, RuleValue};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::coerce;

/// Why a single rule did or did not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Matched,
    NotMatched,
    /// The record has no value for the field.
    FieldMissing,
    /// Values could not be coerced to the operator's kind.
    NotComparable,
}

impl Verdict {
    pub fn is_match(self) -> bool {
        self == Verdict::Matched
    }

    fn from_bool(matched: bool) -> Self {
        if matched { Verdict::Matched } else { Verdict::NotMatched }
    }
}

/// Per-rule diagnostic produced by [`RuleEngine::explain`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutcome {
    pub rule: Rule,
    pub kind: Option<FieldKind>,
    pub actual: Option<Value>,
    pub verdict: Verdict,
}

/// Stateless evaluator of AND-combined rule sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    /// True iff every rule holds. An empty rule set holds.
    pub fn evaluate(&self, record: &LeadRecord, rules: &[Rule]) -> bool {
        rules.iter().all(|rule| self.check(record, rule).is_match())
    }

    /// Verdict of every rule, in order, without short-circuiting.
    pub fn explain(&self, record: &LeadRecord, rules: &[Rule]) -> Vec<RuleOutcome> {
        rules
            .iter()
            .map(|rule| {
                let actual = record.get(rule.field.key()).cloned();
                let kind = actual.as_ref().map(|value| field_kind(rule, value));
                RuleOutcome {
                    rule: rule.clone(),
                    kind,
                    actual,
                    verdict: self.check(record, rule),
                }
            })
            .collect()
    }

    /// First queue, by position and then list order, whose rules match.
    pub fn first_match<'q>(&self, record: &LeadRecord, queues: &'q [Queue]) -> Option<&'q Queue> {
        let mut ordered: Vec<&Queue> = queues.iter().collect();
        ordered.sort_by_key(|q| q.position);
        let matched = ordered
            .into_iter()
            .find(|queue| self.evaluate(record, &queue.rules));
        match matched {
            Some(queue) => debug!(queue_id = %queue.id, "record matched queue"),
            None => debug!(queues = queues.len(), "record matched no queue"),
        }
        matched
    }

    /// Evaluate one rule.
    pub fn check(&self, record: &LeadRecord, rule: &Rule) -> Verdict {
        let Some(value) = record.get(rule.field.key()) else {
            return Verdict::FieldMissing;
        };
        match field_kind(rule, value) {
            FieldKind::Text => check_text(value, rule),
            FieldKind::Number => check_number(value, rule),
            FieldKind::List => check_list(value, rule),
        }
    }
}

fn field_kind(rule: &Rule, value: &Value) -> FieldKind {
    rule.field
        .declared_kind()
        .unwrap_or_else(|| coerce::infer_kind(value))
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn ordered(op: RuleOperator, actual: f64, expected: f64) -> bool {
    match op {
        RuleOperator::GreaterThan => actual > expected,
        RuleOperator::GreaterThanOrEqual => {
            actual > expected || coerce::numbers_equal(actual, expected)
        }
        RuleOperator::LessThan => actual < expected,
        RuleOperator::LessThanOrEqual => actual < expected || coerce::numbers_equal(actual, expected),
        _ => false,
    }
}

fn check_ordered(actual: Option<f64>, rule: &Rule) -> Verdict {
    match (actual, coerce::rule_number(&rule.value)) {
        (Some(a), Some(e)) => Verdict::from_bool(ordered(rule.operator, a, e)),
        _ => Verdict::NotComparable,
    }
}

fn check_text(value: &Value, rule: &Rule) -> Verdict {
    if rule.operator.is_numeric() {
        return check_ordered(coerce::as_number(value), rule);
    }
    let Some(actual) = coerce::as_text(value) else {
        return Verdict::NotComparable;
    };
    let expected = coerce::rule_texts(&rule.value);
    let equals = || expected.iter().any(|e| *e == actual);
    let contains = || expected.iter().any(|e| contains_ci(&actual, e));
    let matched = match rule.operator {
        RuleOperator::Equals | RuleOperator::In => equals(),
        RuleOperator::NotEquals | RuleOperator::NotIn => !equals(),
        RuleOperator::Contains => contains(),
        RuleOperator::NotContains => !contains(),
        _ => false,
    };
    Verdict::from_bool(matched)
}

fn check_number(value: &Value, rule: &Rule) -> Verdict {
    let actual = coerce::as_number(value);
    match rule.operator {
        op if op.is_numeric() => check_ordered(actual, rule),
        // Substring checks on a number compare its written form.
        RuleOperator::Contains | RuleOperator::NotContains => check_text(value, rule),
        RuleOperator::Equals
        | RuleOperator::In
        | RuleOperator::NotEquals
        | RuleOperator::NotIn => {
            let (Some(actual), Some(expected)) = (actual, coerce::rule_numbers(&rule.value)) else {
                return Verdict::NotComparable;
            };
            let found = expected.iter().any(|e| coerce::numbers_equal(actual, *e));
            let negated = matches!(rule.operator, RuleOperator::NotEquals | RuleOperator::NotIn);
            Verdict::from_bool(found != negated)
        }
        _ => Verdict::NotComparable,
    }
}

fn check_list(value: &Value, rule: &Rule) -> Verdict {
    if rule.operator.is_numeric() {
        return Verdict::NotComparable;
    }
    let Some(items) = coerce::as_list(value) else {
        return Verdict::NotComparable;
    };
    let expected = coerce::rule_texts(&rule.value);
    let intersects = || items.iter().any(|item| expected.contains(item));
    let contains = || {
        items
            .iter()
            .any(|item| expected.iter().any(|e| contains_ci(item, e)))
    };
    let matched = match (rule.operator, &rule.value) {
        (RuleOperator::Equals | RuleOperator::In, _) => intersects(),
        (RuleOperator::NotEquals | RuleOperator::NotIn, _) => !intersects(),
        (RuleOperator::Contains, RuleValue::List(_)) => intersects(),
        (RuleOperator::Contains, _) => contains(),
        (RuleOperator::NotContains, RuleValue::List(_)) => !intersects(),
        (RuleOperator::NotContains, _) => !contains(),
        _ => false,
    };
    Verdict::from_bool(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::model::{QueueMember, RuleField};
    use serde_json::json;

    fn rule(field: &str, op: RuleOperator, value: impl Into<RuleValue>) -> Rule {
        Rule::new(field, op, value)
    }

    fn lead() -> LeadRecord {
        LeadRecord::new()
            .with("origem", "Site")
            .with("cidade", "Campinas")
            .with("valor", "750.000,00")
            .with("tags", json!(["vip", "Investidor"]))
            .with("quartos", 3)
            .with("endereco", json!({ "bairro": "Cambuí" }))
    }

    fn eval(r: Rule) -> bool {
        RuleEngine::new().evaluate(&lead(), &[r])
    }

    #[test]
    fn empty_rule_set_matches() {
        assert!(RuleEngine::new().evaluate(&lead(), &[]));
        assert!(RuleEngine::new().evaluate(&LeadRecord::new(), &[]));
    }

    #[test]
    fn equality_is_case_sensitive() {
        assert!(eval(rule("origem", RuleOperator::Equals, "Site")));
        assert!(!eval(rule("origem", RuleOperator::Equals, "site")));
        assert!(eval(rule("origem", RuleOperator::NotEquals, "Facebook")));
    }

    #[test]
    fn contains_is_case_insensitive() {
        assert!(eval(rule("cidade", RuleOperator::Contains, "CAMP")));
        assert!(eval(rule("cidade", RuleOperator::NotContains, "santos")));
        assert!(!eval(rule("cidade", RuleOperator::NotContains, "pinas")));
    }

    #[test]
    fn numeric_comparisons_coerce_text() {
        assert!(eval(rule("valor", RuleOperator::GreaterThan, 500000.0)));
        assert!(eval(rule("valor", RuleOperator::LessThanOrEqual, "750000")));
        assert!(!eval(rule("valor", RuleOperator::LessThan, 750000.0)));
        assert!(eval(rule("valor", RuleOperator::Equals, 750000.0)));
        assert!(eval(rule("quartos", RuleOperator::GreaterThanOrEqual, 3.0)));
    }

    #[test]
    fn numeric_comparison_fails_closed() {
        let engine = RuleEngine::new();
        let record = LeadRecord::new().with("valor", "a combinar");
        let r = rule("valor", RuleOperator::GreaterThan, 1.0);
        assert_eq!(engine.check(&record, &r), Verdict::NotComparable);
        let r = rule("valor", RuleOperator::NotEquals, 1.0);
        assert!(!engine.evaluate(&record, &[r]));
        let r = rule("cidade", RuleOperator::GreaterThan, "abc");
        assert!(!eval(r));
    }

    #[test]
    fn missing_field_is_false_for_every_operator() {
        let engine = RuleEngine::new();
        for op in [
            RuleOperator::Equals,
            RuleOperator::NotEquals,
            RuleOperator::NotContains,
            RuleOperator::NotIn,
            RuleOperator::LessThan,
        ] {
            let r = rule("campanha", op, "verao");
            assert_eq!(engine.check(&lead(), &r), Verdict::FieldMissing);
        }
    }

    #[test]
    fn list_fields_use_membership() {
        assert!(eval(rule("tags", RuleOperator::Equals, "vip")));
        assert!(eval(rule("tags", RuleOperator::In, vec!["frio", "vip"])));
        assert!(eval(rule("tags", RuleOperator::NotIn, vec!["frio"])));
        assert!(eval(rule("tags", RuleOperator::Contains, "invest")));
        assert!(!eval(rule("tags", RuleOperator::Contains, "frio")));
        assert!(!eval(rule("tags", RuleOperator::GreaterThan, 1.0)));
    }

    #[test]
    fn in_on_text_field_is_exact_membership() {
        assert!(eval(rule("origem", RuleOperator::In, vec!["Portal", "Site"])));
        assert!(!eval(rule("origem", RuleOperator::In, vec!["site"])));
        assert!(eval(rule("origem", RuleOperator::NotIn, vec!["Portal"])));
    }

    #[test]
    fn custom_fields_resolve_dotted_paths() {
        assert!(eval(rule("endereco.bairro", RuleOperator::Equals, "Cambuí")));
        let r = Rule::new(RuleField::Custom("quartos".into()), RuleOperator::In, vec!["2", "3"]);
        assert!(eval(r));
    }

    #[test]
    fn explain_reports_each_rule() {
        let rules = vec![
            rule("origem", RuleOperator::Equals, "Site"),
            rule("campanha", RuleOperator::Equals, "x"),
            rule("valor", RuleOperator::GreaterThan, 1_000_000.0),
        ];
        let outcomes = RuleEngine::new().explain(&lead(), &rules);
        let verdicts: Vec<Verdict> = outcomes.iter().map(|o| o.verdict).collect();
        assert_eq!(
            verdicts,
            vec![Verdict::Matched, Verdict::FieldMissing, Verdict::NotMatched]
        );
        assert_eq!(outcomes[2].kind, Some(FieldKind::Number));
    }

    #[test]
    fn first_match_respects_position() {
        let mut catch_all = Queue::new("geral", "Geral")
            .with_rule(rule("cidade", RuleOperator::Contains, "camp"))
            .with_member(QueueMember::new("ana"));
        catch_all.position = 2;
        let mut site = Queue::new("site", "Site")
            .with_rule(rule("origem", RuleOperator::Equals, "Site"))
            .with_member(QueueMember::new("bruno"));
        site.position = 1;
        let queues = vec![catch_all, site];
        let engine = RuleEngine::new();
        assert_eq!(engine.first_match(&lead(), &queues).map(|q| q.id.as_str()), Some("site"));

        let facebook = LeadRecord::new().with("origem", "Facebook");
        assert!(engine.first_match(&facebook, &queues).is_none());
    }
}
