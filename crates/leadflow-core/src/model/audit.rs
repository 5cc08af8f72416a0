// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redistribution history: append-only audit records of lead reassignments
//! and the filter used to query them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::types::{AgentId, Channel, LeadId, QueueId};

/// Who triggered a reassignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Responsible {
    #[default]
    System,
    User(AgentId),
}

impl Responsible {
    /// Filter/group label: `system` or the user id.
    pub fn label(&self) -> &str {
        match self {
            Responsible::System => "system",
            Responsible::User(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Responsible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum OperationType {
    Distribution,
    Redistribution,
    Escalation,
    Overflow,
    ManualTransfer,
    Batch,
}

/// Time between a lead's previous assignment and its redistribution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum TimeBucket {
    #[serde(rename = "<=5min")]
    #[strum(to_string = "<=5min", serialize = "5min")]
    UpTo5Minutes,
    #[serde(rename = "<=1h")]
    #[strum(to_string = "<=1h", serialize = "1h")]
    UpTo1Hour,
    #[serde(rename = "<=24h")]
    #[strum(to_string = "<=24h", serialize = "24h")]
    UpTo24Hours,
    #[serde(rename = ">24h")]
    #[strum(to_string = ">24h", serialize = "over-24h")]
    Over24Hours,
}

impl TimeBucket {
    pub fn from_elapsed(elapsed: Duration) -> Self {
        if elapsed <= Duration::minutes(5) {
            TimeBucket::UpTo5Minutes
        } else if elapsed <= Duration::hours(1) {
            TimeBucket::UpTo1Hour
        } else if elapsed <= Duration::hours(24) {
            TimeBucket::UpTo24Hours
        } else {
            TimeBucket::Over24Hours
        }
    }
}

/// Lead identity snapshot stored with the audit record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadIdentity {
    pub id: LeadId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl LeadIdentity {
    pub fn new(id: impl Into<LeadId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Case-insensitive search across id, name, email, and phone.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [
            Some(self.id.as_str()),
            self.name.as_deref(),
            self.email.as_deref(),
            self.phone.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// One immutable reassignment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedistributionHistoryItem {
    pub id: String,
    #[serde(alias = "motivo")]
    pub reason: String,
    #[serde(default, alias = "responsavel")]
    pub responsible: Responsible,
    /// Broker who received the lead.
    #[serde(default, alias = "corretor")]
    pub broker: Option<AgentId>,
    /// Broker who held the lead before.
    #[serde(default)]
    pub previous_broker: Option<AgentId>,
    #[serde(default)]
    pub source_queue: Option<QueueId>,
    #[serde(default)]
    pub target_queue: Option<QueueId>,
    #[serde(default)]
    pub tag: Option<String>,
    pub operation_type: OperationType,
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub campaign: Option<String>,
    #[serde(default)]
    pub current_status: Option<String>,
    #[serde(default)]
    pub time_bucket: Option<TimeBucket>,
    pub lead: LeadIdentity,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl RedistributionHistoryItem {
    pub fn new(
        lead: LeadIdentity,
        operation_type: OperationType,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reason: reason.into(),
            responsible: Responsible::System,
            broker: None,
            previous_broker: None,
            source_queue: None,
            target_queue: None,
            tag: None,
            operation_type,
            pipeline: None,
            stage: None,
            channel: None,
            campaign: None,
            current_status: None,
            time_bucket: None,
            lead,
            timestamp,
            quantity: 1,
        }
    }
}

/// A dimension audit records can be filtered or grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum AuditDimension {
    Reason,
    Responsible,
    Broker,
    SourceQueue,
    TargetQueue,
    Tag,
    OperationType,
    Pipeline,
    Stage,
    Channel,
    Campaign,
    Status,
    TimeBucket,
}

impl AuditDimension {
    /// The item's value in this dimension, if it has one.
    pub fn value_of(self, item: &RedistributionHistoryItem) -> Option<String> {
        match self {
            AuditDimension::Reason => Some(item.reason.clone()),
            AuditDimension::Responsible => Some(item.responsible.label().to_string()),
            AuditDimension::Broker => item.broker.as_ref().map(ToString::to_string),
            AuditDimension::SourceQueue => item.source_queue.as_ref().map(ToString::to_string),
            AuditDimension::TargetQueue => item.target_queue.as_ref().map(ToString::to_string),
            AuditDimension::Tag => item.tag.clone(),
            AuditDimension::OperationType => Some(item.operation_type.to_string()),
            AuditDimension::Pipeline => item.pipeline.clone(),
            AuditDimension::Stage => item.stage.clone(),
            AuditDimension::Channel => item.channel.map(|c| c.to_string()),
            AuditDimension::Campaign => item.campaign.clone(),
            AuditDimension::Status => item.current_status.clone(),
            AuditDimension::TimeBucket => item.time_bucket.map(|b| b.to_string()),
        }
    }
}

/// Query over the redistribution history.
///
/// Dimensions are ANDed; several values in one dimension match any of them.
/// An empty dimension places no constraint. `from`/`to` are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditFilter {
    pub reasons: Vec<String>,
    pub responsible: Vec<String>,
    pub brokers: Vec<AgentId>,
    pub source_queues: Vec<QueueId>,
    pub target_queues: Vec<QueueId>,
    pub tags: Vec<String>,
    pub operation_types: Vec<OperationType>,
    pub pipelines: Vec<String>,
    pub stages: Vec<String>,
    pub channels: Vec<Channel>,
    pub campaigns: Vec<String>,
    pub statuses: Vec<String>,
    pub time_buckets: Vec<TimeBucket>,
    /// Free-text searches over the lead identity; every term must match.
    pub lead_search: Vec<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Set when composition left a dimension with no admissible value.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub matches_nothing: bool,
}

fn any_of<T: PartialEq>(allowed: &[T], value: Option<&T>) -> bool {
    allowed.is_empty() || value.is_some_and(|v| allowed.contains(v))
}

/// Narrow `left` to the values both sides admit. Returns false when both
/// constrain the dimension and share no value.
fn intersect<T: PartialEq>(left: &mut Vec<T>, right: Vec<T>) -> bool {
    if right.is_empty() {
        return true;
    }
    if left.is_empty() {
        *left = right;
        return true;
    }
    left.retain(|value| right.contains(value));
    !left.is_empty()
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broker(mut self, broker: impl Into<AgentId>) -> Self {
        self.brokers.push(broker.into());
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stages.push(stage.into());
        self
    }

    pub fn operation(mut self, operation: OperationType) -> Self {
        self.operation_types.push(operation);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.lead_search.push(term.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Combine two filters so the result matches exactly what both match.
    pub fn and(mut self, other: AuditFilter) -> Self {
        let mut satisfiable = !self.matches_nothing && !other.matches_nothing;
        satisfiable &= intersect(&mut self.reasons, other.reasons);
        satisfiable &= intersect(&mut self.responsible, other.responsible);
        satisfiable &= intersect(&mut self.brokers, other.brokers);
        satisfiable &= intersect(&mut self.source_queues, other.source_queues);
        satisfiable &= intersect(&mut self.target_queues, other.target_queues);
        satisfiable &= intersect(&mut self.tags, other.tags);
        satisfiable &= intersect(&mut self.operation_types, other.operation_types);
        satisfiable &= intersect(&mut self.pipelines, other.pipelines);
        satisfiable &= intersect(&mut self.stages, other.stages);
        satisfiable &= intersect(&mut self.channels, other.channels);
        satisfiable &= intersect(&mut self.campaigns, other.campaigns);
        satisfiable &= intersect(&mut self.statuses, other.statuses);
        satisfiable &= intersect(&mut self.time_buckets, other.time_buckets);
        self.matches_nothing = !satisfiable;

        for term in other.lead_search {
            if !self.lead_search.contains(&term) {
                self.lead_search.push(term);
            }
        }
        self.from = match (self.from, other.from) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.to = match (self.to, other.to) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self
    }

    pub fn matches(&self, item: &RedistributionHistoryItem) -> bool {
        if self.matches_nothing {
            return false;
        }
        let responsible = item.responsible.label().to_string();
        any_of(&self.reasons, Some(&item.reason))
            && any_of(&self.responsible, Some(&responsible))
            && any_of(&self.brokers, item.broker.as_ref())
            && any_of(&self.source_queues, item.source_queue.as_ref())
            && any_of(&self.target_queues, item.target_queue.as_ref())
            && any_of(&self.tags, item.tag.as_ref())
            && any_of(&self.operation_types, Some(&item.operation_type))
            && any_of(&self.pipelines, item.pipeline.as_ref())
            && any_of(&self.stages, item.stage.as_ref())
            && any_of(&self.channels, item.channel.as_ref())
            && any_of(&self.campaigns, item.campaign.as_ref())
            && any_of(&self.statuses, item.current_status.as_ref())
            && any_of(&self.time_buckets, item.time_bucket.as_ref())
            && self
                .lead_search
                .iter()
                .all(|needle| item.lead.matches_search(needle))
            && self.from.is_none_or(|from| item.timestamp >= from)
            && self.to.is_none_or(|to| item.timestamp <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(broker: &str, stage: &str, day: u32) -> RedistributionHistoryItem {
        let mut item = RedistributionHistoryItem::new(
            LeadIdentity::new(format!("lead-{broker}-{day}")),
            OperationType::Redistribution,
            "sem contato",
            Utc.with_ymd_and_hms(2026, 5, day, 12, 0, 0).unwrap(),
        );
        item.broker = Some(broker.into());
        item.stage = Some(stage.into());
        item
    }

    #[test]
    fn time_buckets_have_inclusive_upper_bounds() {
        assert_eq!(TimeBucket::from_elapsed(Duration::minutes(5)), TimeBucket::UpTo5Minutes);
        assert_eq!(TimeBucket::from_elapsed(Duration::minutes(6)), TimeBucket::UpTo1Hour);
        assert_eq!(TimeBucket::from_elapsed(Duration::hours(24)), TimeBucket::UpTo24Hours);
        assert_eq!(TimeBucket::from_elapsed(Duration::hours(25)), TimeBucket::Over24Hours);
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(AuditFilter::new().matches(&item("ana", "Visita", 1)));
    }

    #[test]
    fn values_within_a_dimension_are_alternatives() {
        let filter = AuditFilter::new().broker("ana").broker("bruno");
        assert!(filter.matches(&item("ana", "Visita", 1)));
        assert!(filter.matches(&item("bruno", "Visita", 1)));
        assert!(!filter.matches(&item("carla", "Visita", 1)));
    }

    #[test]
    fn dimensions_are_anded() {
        let filter = AuditFilter::new().broker("ana").stage("Visita");
        assert!(filter.matches(&item("ana", "Visita", 1)));
        assert!(!filter.matches(&item("ana", "Proposta", 1)));
    }

    #[test]
    fn date_range_is_inclusive() {
        let from = Utc.with_ymd_and_hms(2026, 5, 2, 12, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
        let filter = AuditFilter::new().between(from, to);
        assert!(!filter.matches(&item("ana", "x", 1)));
        assert!(filter.matches(&item("ana", "x", 2)));
        assert!(filter.matches(&item("ana", "x", 4)));
        assert!(!filter.matches(&item("ana", "x", 5)));
    }

    #[test]
    fn missing_value_fails_constrained_dimension() {
        let mut record = item("ana", "x", 1);
        record.campaign = None;
        let filter = AuditFilter {
            campaigns: vec!["verao".into()],
            ..AuditFilter::default()
        };
        assert!(!filter.matches(&record));
    }

    #[test]
    fn lead_search_is_case_insensitive() {
        let mut record = item("ana", "x", 1);
        record.lead.email = Some("Maria@Example.com".into());
        assert!(AuditFilter::new().search("maria@").matches(&record));
        assert!(!AuditFilter::new().search("maria@").search("joao").matches(&record));
    }

    #[test]
    fn composing_one_dimension_intersects_its_values() {
        let ana = item("ana", "Visita", 1);
        let bruno = item("bruno", "Visita", 1);

        let disjoint = AuditFilter::new().broker("ana").and(AuditFilter::new().broker("bruno"));
        assert!(disjoint.matches_nothing);
        assert!(!disjoint.matches(&ana));
        assert!(!disjoint.matches(&bruno));

        let overlap = AuditFilter::new()
            .broker("ana")
            .broker("bruno")
            .and(AuditFilter::new().broker("bruno").broker("carla"));
        assert_eq!(overlap.brokers, vec![AgentId::from("bruno")]);
        assert!(!overlap.matches(&ana));
        assert!(overlap.matches(&bruno));

        // An unsatisfiable side stays unsatisfiable under further composition.
        assert!(!disjoint.and(AuditFilter::new()).matches(&ana));
    }

    #[test]
    fn dimension_values() {
        let record = item("ana", "Visita", 1);
        assert_eq!(AuditDimension::Broker.value_of(&record), Some("ana".into()));
        assert_eq!(AuditDimension::Responsible.value_of(&record), Some("system".into()));
        assert_eq!(
            AuditDimension::OperationType.value_of(&record),
            Some("redistribution".into())
        );
        assert_eq!(AuditDimension::Tag.value_of(&record), None);
        assert_eq!("source-queue".parse::<AuditDimension>().unwrap(), AuditDimension::SourceQueue);
    }

    #[test]
    fn bucket_wire_labels() {
        assert_eq!(serde_json::to_string(&TimeBucket::Over24Hours).unwrap(), "\">24h\"");
        assert_eq!(TimeBucket::UpTo1Hour.to_string(), "<=1h");
        assert_eq!("1h".parse::<TimeBucket>().unwrap(), TimeBucket::UpTo1Hour);
    }
}
