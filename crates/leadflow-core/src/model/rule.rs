// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative rules (regras) combined with AND into rule sets.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::types::RuleId;

/// How values of a field are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    List,
}

/// A record attribute a rule can inspect.
///
/// Known CRM attributes carry a declared kind; any other key is a custom
/// field whose kind is inferred from the record value at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleField {
    /// Lead source (site, portal, facebook, indicação).
    Origem,
    Campanha,
    /// Venda or locação.
    TipoNegocio,
    TipoImovel,
    Cidade,
    Bairro,
    /// Property value in BRL.
    Valor,
    /// Funnel stage.
    Etapa,
    /// Pipeline (funil) name.
    Funil,
    Tags,
    Custom(String),
}

impl RuleField {
    /// The record key this field reads.
    pub fn key(&self) -> &str {
        match self {
            RuleField::Origem => "origem",
            RuleField::Campanha => "campanha",
            RuleField::TipoNegocio => "tipoNegocio",
            RuleField::TipoImovel => "tipoImovel",
            RuleField::Cidade => "cidade",
            RuleField::Bairro => "bairro",
            RuleField::Valor => "valor",
            RuleField::Etapa => "etapa",
            RuleField::Funil => "funil",
            RuleField::Tags => "tags",
            RuleField::Custom(key) => key,
        }
    }

    /// Declared kind, or `None` for custom fields.
    pub fn declared_kind(&self) -> Option<FieldKind> {
        match self {
            RuleField::Valor => Some(FieldKind::Number),
            RuleField::Tags => Some(FieldKind::List),
            RuleField::Custom(_) => None,
            _ => Some(FieldKind::Text),
        }
    }
}

impl From<String> for RuleField {
    fn from(key: String) -> Self {
        match key.as_str() {
            "origem" | "source" => RuleField::Origem,
            "campanha" | "campaign" => RuleField::Campanha,
            "tipoNegocio" | "businessType" => RuleField::TipoNegocio,
            "tipoImovel" | "propertyType" => RuleField::TipoImovel,
            "cidade" | "city" => RuleField::Cidade,
            "bairro" | "neighborhood" => RuleField::Bairro,
            "valor" | "value" => RuleField::Valor,
            "etapa" | "stage" => RuleField::Etapa,
            "funil" | "pipeline" => RuleField::Funil,
            "tags" => RuleField::Tags,
            _ => RuleField::Custom(key),
        }
    }
}

impl From<&str> for RuleField {
    fn from(key: &str) -> Self {
        RuleField::from(key.to_string())
    }
}

impl From<RuleField> for String {
    fn from(field: RuleField) -> Self {
        field.key().to_string()
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Comparison applied between the record value and the rule value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum RuleOperator {
    #[serde(alias = "igual")]
    Equals,
    #[serde(alias = "diferente")]
    NotEquals,
    #[serde(alias = "contem", alias = "contém")]
    Contains,
    #[serde(alias = "naoContem")]
    NotContains,
    #[serde(alias = "maiorQue", alias = "maior")]
    GreaterThan,
    #[serde(alias = "maiorOuIgual")]
    GreaterThanOrEqual,
    #[serde(alias = "menorQue", alias = "menor")]
    LessThan,
    #[serde(alias = "menorOuIgual")]
    LessThanOrEqual,
    #[serde(alias = "em")]
    In,
    #[serde(alias = "naoEm")]
    NotIn,
}

impl RuleOperator {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            RuleOperator::GreaterThan
                | RuleOperator::GreaterThanOrEqual
                | RuleOperator::LessThan
                | RuleOperator::LessThanOrEqual
        )
    }
}

/// Right-hand side of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl From<&str> for RuleValue {
    fn from(value: &str) -> Self {
        RuleValue::Text(value.to_string())
    }
}

impl From<f64> for RuleValue {
    fn from(value: f64) -> Self {
        RuleValue::Number(value)
    }
}

impl From<Vec<&str>> for RuleValue {
    fn from(values: Vec<&str>) -> Self {
        RuleValue::List(values.into_iter().map(str::to_string).collect())
    }
}

/// A single field/operator/value condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default = "RuleId::generate")]
    pub id: RuleId,
    #[serde(alias = "campo")]
    pub field: RuleField,
    #[serde(alias = "operador")]
    pub operator: RuleOperator,
    #[serde(alias = "valor")]
    pub value: RuleValue,
}

impl Rule {
    pub fn new(
        field: impl Into<RuleField>,
        operator: RuleOperator,
        value: impl Into<RuleValue>,
    ) -> Self {
        Self {
            id: RuleId::generate(),
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match &self.value {
            RuleValue::Number(n) => n.to_string(),
            RuleValue::Text(text) => format!("{text:?}"),
            RuleValue::List(items) => format!("{items:?}"),
        };
        write!(f, "{} {} {}", self.field, self.operator, value)
    }
}
