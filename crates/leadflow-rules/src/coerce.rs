// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Value coercion between JSON record values and rule values.

use leadflow_core::model::{FieldKind, RuleValue};
use serde_json::Value;

/// Kind of a record value when the field declares none.
pub fn infer_kind(value: &Value) -> FieldKind {
    match value {
        Value::Number(_) => FieldKind::Number,
        Value::Array(_) => FieldKind::List,
        _ => FieldKind::Text,
    }
}

/// Textual form of a scalar record value. Objects and arrays have none.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Elements of a list-valued record field; a scalar is a one-element list.
pub fn as_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(as_text).collect()),
        other => as_text(other).map(|text| vec![text]),
    }
}

pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Parse a number written by a person: `500000`, `500.000,00`,
/// `R$ 1.250.000`, `3,5`, `1,250.75`.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both separators: the last one is the decimal mark.
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        (None, Some(_)) if is_thousands_grouping(&cleaned, '.') => cleaned.replace('.', ""),
        _ => cleaned,
    };
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// `1.250.000` style grouping: trailing groups of exactly three digits.
fn is_thousands_grouping(text: &str, separator: char) -> bool {
    let groups: Vec<&str> = text.trim_start_matches('-').split(separator).collect();
    groups.len() >= 2
        && !groups[0].is_empty()
        && groups[0].len() <= 3
        && groups[1..].iter().all(|g| g.len() == 3)
        && groups.iter().all(|g| g.chars().all(|c| c.is_ascii_digit()))
}

/// Rule value items as text.
pub fn rule_texts(value: &RuleValue) -> Vec<String> {
    match value {
        RuleValue::Text(text) => vec![text.clone()],
        RuleValue::Number(n) => vec![n.to_string()],
        RuleValue::List(items) => items.clone(),
    }
}

/// Rule value items as numbers; `None` if any item is not numeric.
pub fn rule_numbers(value: &RuleValue) -> Option<Vec<f64>> {
    match value {
        RuleValue::Number(n) => n.is_finite().then(|| vec![*n]),
        RuleValue::Text(text) => parse_number(text).map(|n| vec![n]),
        RuleValue::List(items) => items.iter().map(|i| parse_number(i)).collect(),
    }
}

/// Single numeric operand for ordered comparisons.
pub fn rule_number(value: &RuleValue) -> Option<f64> {
    match value {
        RuleValue::List(_) => None,
        other => rule_numbers(other).and_then(|v| v.first().copied()),
    }
}

pub fn numbers_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0)
}
