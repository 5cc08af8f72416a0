// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for rule-set semantics.

use leadflow_core::LeadRecord;
use leadflow_core::model::{Rule, RuleOperator, RuleValue};
use leadflow_rules::RuleEngine;
use proptest::prelude::*;

const FIELDS: &[&str] = &["origem", "cidade", "valor", "tags", "campanha", "score"];
const WORDS: &[&str] = &["Site", "site", "Portal", "Campinas", "vip", "100", "250,5", "x"];

fn operator() -> impl Strategy<Value = RuleOperator> {
    prop::sample::select(vec![
        RuleOperator::Equals,
        RuleOperator::NotEquals,
        RuleOperator::Contains,
        RuleOperator::NotContains,
        RuleOperator::GreaterThan,
        RuleOperator::GreaterThanOrEqual,
        RuleOperator::LessThan,
        RuleOperator::LessThanOrEqual,
        RuleOperator::In,
        RuleOperator::NotIn,
    ])
}

fn word() -> impl Strategy<Value = String> {
    prop::sample::select(WORDS).prop_map(str::to_string)
}

fn rule_value() -> impl Strategy<Value = RuleValue> {
    prop_oneof![
        word().prop_map(RuleValue::Text),
        (0.0f64..1000.0).prop_map(RuleValue::Number),
        prop::collection::vec(word(), 0..3).prop_map(RuleValue::List),
    ]
}

fn rule() -> impl Strategy<Value = Rule> {
    (prop::sample::select(FIELDS), operator(), rule_value())
        .prop_map(|(field, op, value)| Rule::new(field, op, value))
}

fn record() -> impl Strategy<Value = LeadRecord> {
    let value = prop_oneof![
        word().prop_map(serde_json::Value::from),
        (0u32..1000).prop_map(serde_json::Value::from),
        prop::collection::vec(word(), 0..3).prop_map(serde_json::Value::from),
        Just(serde_json::Value::Null),
    ];
    prop::collection::btree_map(prop::sample::select(FIELDS), value, 0..FIELDS.len()).prop_map(
        |fields| {
            fields
                .into_iter()
                .fold(LeadRecord::new(), |record, (k, v)| record.with(k, v))
        },
    )
}

proptest! {
    #[test]
    fn rule_set_is_conjunction_of_rules(record in record(), rules in prop::collection::vec(rule(), 0..6)) {
        let engine = RuleEngine::new();
        let together = engine.evaluate(&record, &rules);
        let each = rules.iter().all(|r| engine.evaluate(&record, std::slice::from_ref(r)));
        prop_assert_eq!(together, each);
    }

    #[test]
    fn concatenation_is_and(
        record in record(),
        a in prop::collection::vec(rule(), 0..4),
        b in prop::collection::vec(rule(), 0..4),
    ) {
        let engine = RuleEngine::new();
        let joined: Vec<Rule> = a.iter().chain(b.iter()).cloned().collect();
        prop_assert_eq!(
            engine.evaluate(&record, &joined),
            engine.evaluate(&record, &a) && engine.evaluate(&record, &b)
        );
    }

    #[test]
    fn evaluation_is_order_independent(record in record(), rules in prop::collection::vec(rule(), 0..6)) {
        let engine = RuleEngine::new();
        let mut reversed = rules.clone();
        reversed.reverse();
        prop_assert_eq!(engine.evaluate(&record, &rules), engine.evaluate(&record, &reversed));
    }

    #[test]
    fn missing_fields_never_match(rule in rule()) {
        let engine = RuleEngine::new();
        prop_assert!(!engine.evaluate(&LeadRecord::new(), &[rule]));
    }
}
