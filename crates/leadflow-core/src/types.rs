// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the model, the engine, and the storage backends.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a distribution queue (fila).
    QueueId
);
string_id!(
    /// Identifier of a cadence definition.
    CadenceId
);
string_id!(
    /// Identifier of a step inside a cadence.
    StepId
);
string_id!(
    /// Identifier of a rule inside a rule set.
    RuleId
);
string_id!(
    /// Identifier of a lead in the CRM.
    LeadId
);
string_id!(
    /// Identifier of a user who can receive leads (broker / corretor).
    AgentId
);
string_id!(
    /// Identifier of a running cadence instance.
    InstanceId
);

/// Outreach channel used by a cadence step or a recorded contact attempt.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Channel {
    #[serde(alias = "WhatsApp", alias = "whatsApp")]
    Whatsapp,
    #[serde(alias = "ligacao", alias = "Ligação", alias = "ligação")]
    #[strum(to_string = "call", serialize = "ligacao")]
    Call,
    #[serde(alias = "E-mail", alias = "e-mail")]
    #[strum(to_string = "email", serialize = "e-mail")]
    Email,
    #[serde(alias = "scheduleVisit", alias = "agendar-visita")]
    #[strum(to_string = "schedule-visit", serialize = "agendar-visita")]
    ScheduleVisit,
}

impl Channel {
    /// Channels where an attempt means trying to reach the lead.
    pub fn is_contact_channel(self) -> bool {
        !matches!(self, Channel::ScheduleVisit)
    }
}

/// An opaque key-value lead record as received from the CRM.
///
/// The engine is agnostic to its schema beyond the fields referenced by
/// configured rules. Dotted paths (`endereco.cidade`) resolve nested objects
/// when no top-level key with the literal name exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadRecord {
    fields: Map<String, Value>,
}

impl LeadRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used heavily by fixtures.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Resolve a field by exact key, then by dotted path.
    ///
    /// JSON `null` counts as missing.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(path) {
            return non_null(value);
        }
        if !path.contains('.') {
            return None;
        }
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        non_null(current)
    }

    /// Convenience accessor for string-valued fields.
    pub fn text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

fn non_null(value: &Value) -> Option<&Value> {
    if value.is_null() { None } else { Some(value) }
}

impl From<Map<String, Value>> for LeadRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// What happened to a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LeadEventKind {
    /// A new lead entered the CRM.
    Created,
    /// The lead moved to a funnel stage.
    StageChanged { stage: String },
    /// The lead has not answered for `hours` hours.
    NoResponse { hours: u32 },
    /// The lead has had no activity for `days` days.
    Inactive { days: u32 },
    /// Days elapsed since the deal was closed.
    #[serde(rename_all = "camelCase")]
    PostSale { days_since_close: u32 },
    /// A user attached a cadence by hand.
    #[serde(rename_all = "camelCase")]
    Manual {
        #[serde(default)]
        cadence_id: Option<CadenceId>,
    },
}

/// A lead event delivered to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadEvent {
    pub lead_id: LeadId,
    pub kind: LeadEventKind,
    #[serde(default)]
    pub record: LeadRecord,
    pub occurred_at: DateTime<Utc>,
}

impl LeadEvent {
    pub fn new(lead_id: impl Into<LeadId>, kind: LeadEventKind, record: LeadRecord) -> Self {
        Self {
            lead_id: lead_id.into(),
            kind,
            record,
            occurred_at: Utc::now(),
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use serde_json::json;

    #[test]
    fn record_resolves_exact_key_before_dotted_path() {
        let record = LeadRecord::new()
            .with("endereco.cidade", "Literal")
            .with("endereco", json!({ "cidade": "Campinas" }));
        assert_eq!(record.text("endereco.cidade"), Some("Literal"));
    }

    #[test]
    fn record_resolves_nested_path() {
        let record = LeadRecord::new().with("endereco", json!({ "cidade": "Campinas" }));
        assert_eq!(record.text("endereco.cidade"), Some("Campinas"));
        assert!(record.get("endereco.bairro").is_none());
        assert!(record.get("telefone").is_none());
    }

    #[test]
    fn null_values_count_as_missing() {
        let record = LeadRecord::new().with("origem", Value::Null);
        assert!(record.get("origem").is_none());
    }

    #[test]
    fn channel_accepts_source_vocabulary() {
        let parsed: Channel = serde_json::from_str("\"WhatsApp\"").unwrap();
        assert_eq!(parsed, Channel::Whatsapp);
        let parsed: Channel = serde_json::from_str("\"ligacao\"").unwrap();
        assert_eq!(parsed, Channel::Call);
        assert_eq!(Channel::from_str("E-mail").unwrap(), Channel::Email);
        assert_eq!(Channel::ScheduleVisit.to_string(), "schedule-visit");
        assert!(!Channel::ScheduleVisit.is_contact_channel());
    }

    #[test]
    fn lead_event_kind_wire_format() {
        let kind: LeadEventKind =
            serde_json::from_value(json!({ "type": "post-sale", "daysSinceClose": 30 })).unwrap();
        assert_eq!(kind, LeadEventKind::PostSale { days_since_close: 30 });

        let event: LeadEvent = serde_json::from_value(json!({
            "leadId": "lead-1",
            "kind": { "type": "stage-changed", "stage": "Visita" },
            "occurredAt": "2026-03-02T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(event.kind, LeadEventKind::StageChanged { stage: "Visita".into() });
        assert!(event.record.fields().is_empty());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(QueueId::generate(), QueueId::generate());
        assert_eq!(AgentId::from("ana").to_string(), "ana");
    }
}
