// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The audit log service over an [`AuditStore`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use leadflow_core::LeadflowError;
use leadflow_core::model::{
    AuditDimension, AuditFilter, LeadIdentity, OperationType, RedistributionHistoryItem,
    Responsible, TimeBucket,
};
use leadflow_core::traits::AuditStore;
use leadflow_core::types::{AgentId, Channel, QueueId};
use serde::Serialize;
use tracing::{debug, error};

/// Label used when grouping items that have no value in a dimension.
const UNSET: &str = "(none)";

/// Everything known about a reassignment when it happens.
#[derive(Debug, Clone)]
pub struct RedistributionContext {
    pub lead: LeadIdentity,
    pub operation: OperationType,
    pub reason: String,
    pub responsible: Responsible,
    pub broker: Option<AgentId>,
    pub previous_broker: Option<AgentId>,
    pub source_queue: Option<QueueId>,
    pub target_queue: Option<QueueId>,
    pub tag: Option<String>,
    pub pipeline: Option<String>,
    pub stage: Option<String>,
    pub channel: Option<Channel>,
    pub campaign: Option<String>,
    pub current_status: Option<String>,
    /// When the lead was last assigned; drives the time bucket.
    pub previously_assigned_at: Option<DateTime<Utc>>,
    pub quantity: u32,
    pub at: DateTime<Utc>,
}

impl RedistributionContext {
    pub fn new(
        lead: LeadIdentity,
        operation: OperationType,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            lead,
            operation,
            reason: reason.into(),
            responsible: Responsible::System,
            broker: None,
            previous_broker: None,
            source_queue: None,
            target_queue: None,
            tag: None,
            pipeline: None,
            stage: None,
            channel: None,
            campaign: None,
            current_status: None,
            previously_assigned_at: None,
            quantity: 1,
            at,
        }
    }

    fn into_item(self) -> RedistributionHistoryItem {
        let time_bucket = self
            .previously_assigned_at
            .map(|previous| TimeBucket::from_elapsed(self.at - previous));
        let mut item =
            RedistributionHistoryItem::new(self.lead, self.operation, self.reason, self.at);
        item.responsible = self.responsible;
        item.broker = self.broker;
        item.previous_broker = self.previous_broker;
        item.source_queue = self.source_queue;
        item.target_queue = self.target_queue;
        item.tag = self.tag;
        item.pipeline = self.pipeline;
        item.stage = self.stage;
        item.channel = self.channel;
        item.campaign = self.campaign;
        item.current_status = self.current_status;
        item.time_bucket = time_bucket;
        item.quantity = self.quantity.max(1);
        item
    }
}

/// One row of a [`RedistributionAuditLog::summarize`] table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionCount {
    pub value: String,
    /// Sum of `quantity` over the grouped items.
    pub count: u64,
}

/// Append-only redistribution history.
#[derive(Clone)]
pub struct RedistributionAuditLog {
    store: Arc<dyn AuditStore>,
    enabled: bool,
}

impl RedistributionAuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            enabled: true,
        }
    }

    /// A disabled log accepts appends without writing them.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Durably append one item. Storage failures are returned to the caller,
    /// which must not proceed as if the reassignment were recorded.
    pub async fn append(&self, item: &RedistributionHistoryItem) -> Result<(), LeadflowError> {
        if !self.enabled {
            return Ok(());
        }
        if let Err(err) = self.store.append(item).await {
            error!(item_id = %item.id, lead_id = %item.lead.id, error = %err, "audit append failed");
            return Err(err);
        }
        self.appended(item);
        Ok(())
    }

    /// The item to store for `context`, or `None` when the log is disabled.
    ///
    /// For writers that store the item themselves, together with the state
    /// change it records. They report it through [`appended`](Self::appended).
    pub fn entry(&self, context: RedistributionContext) -> Option<RedistributionHistoryItem> {
        self.enabled.then(|| context.into_item())
    }

    /// Account for an item stored outside [`append`](Self::append).
    pub fn appended(&self, item: &RedistributionHistoryItem) {
        metrics::counter!(
            "leadflow_audit_records_total",
            "operation" => item.operation_type.to_string()
        )
        .increment(1);
        debug!(
            item_id = %item.id,
            lead_id = %item.lead.id,
            operation = %item.operation_type,
            broker = item.broker.as_ref().map(|b| b.as_str()).unwrap_or(UNSET),
            "audit record appended"
        );
    }

    /// Build an item from `context` (computing its time bucket) and append it.
    pub async fn record_redistribution(
        &self,
        context: RedistributionContext,
    ) -> Result<RedistributionHistoryItem, LeadflowError> {
        let item = context.into_item();
        self.append(&item).await?;
        Ok(item)
    }

    /// Items matching `filter`, newest first. Ties break on id so the order
    /// is stable across backends.
    pub async fn query(
        &self,
        filter: &AuditFilter,
    ) -> Result<Vec<RedistributionHistoryItem>, LeadflowError> {
        let mut items = self.store.query(filter).await?;
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Totals of matching items grouped by `dimension`, largest first.
    pub async fn summarize(
        &self,
        filter: &AuditFilter,
        dimension: AuditDimension,
    ) -> Result<Vec<DimensionCount>, LeadflowError> {
        let items = self.store.query(filter).await?;
        let mut totals: HashMap<String, u64> = HashMap::new();
        for item in &items {
            let key = dimension
                .value_of(item)
                .unwrap_or_else(|| UNSET.to_string());
            *totals.entry(key).or_insert(0) += u64::from(item.quantity);
        }
        let mut rows: Vec<DimensionCount> = totals
            .into_iter()
            .map(|(value, count)| DimensionCount { value, count })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn context_computes_time_bucket() {
        let at = Utc.with_ymd_and_hms(2026, 2, 10, 15, 0, 0).unwrap();
        let mut context = RedistributionContext::new(
            LeadIdentity::new("lead-1"),
            OperationType::Redistribution,
            "sem contato",
            at,
        );
        context.previously_assigned_at = Some(at - Duration::minutes(45));
        let item = context.clone().into_item();
        assert_eq!(item.time_bucket, Some(TimeBucket::UpTo1Hour));

        context.previously_assigned_at = Some(at - Duration::days(2));
        assert_eq!(context.into_item().time_bucket, Some(TimeBucket::Over24Hours));
    }

    #[test]
    fn disabled_log_builds_no_entry() {
        let context = RedistributionContext::new(
            LeadIdentity::new("lead-1"),
            OperationType::Distribution,
            "nova entrada",
            Utc::now(),
        );
        let log = RedistributionAuditLog::new(Arc::new(leadflow_storage::MemoryStorage::new()));
        assert!(log.entry(context.clone()).is_some());
        assert!(log.with_enabled(false).entry(context).is_none());
    }

    #[test]
    fn first_distribution_has_no_bucket() {
        let item = RedistributionContext::new(
            LeadIdentity::new("lead-1"),
            OperationType::Distribution,
            "nova entrada",
            Utc::now(),
        )
        .into_item();
        assert_eq!(item.time_bucket, None);
        assert_eq!(item.quantity, 1);
    }
}
