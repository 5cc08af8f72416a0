// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialized, persisted queue assignment.
//!
//! One async mutex per queue id serializes assignments inside this process;
//! the store's version check catches writers outside it (definition edits,
//! other engine processes). The history entry is committed in the same
//! write as the rotation state, so neither is visible without the other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use leadflow_core::model::RedistributionHistoryItem;
use leadflow_core::traits::QueueStore;
use leadflow_core::{AgentId, LeadflowError, QueueId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::assignor::QueueAssignor;
use crate::metrics;

/// A completed assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentOutcome {
    /// Queue the agent was taken from.
    pub queue_id: QueueId,
    pub agent_id: AgentId,
    /// Set when the lead spilled over from a queue with nobody eligible.
    pub overflowed_from: Option<QueueId>,
    /// Queue version after the rotation state was saved.
    pub queue_version: u64,
}

/// Supplies the history entry committed with an assignment.
pub trait AssignmentRecorder: Send + Sync {
    /// Entry for `outcome`, or `None` to commit the rotation state alone.
    fn entry(&self, outcome: &AssignmentOutcome) -> Option<RedistributionHistoryItem>;

    /// Called once `entry` is durably stored.
    fn committed(&self, _entry: &RedistributionHistoryItem) {}
}

/// Recorder that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl AssignmentRecorder for NoopRecorder {
    fn entry(&self, _outcome: &AssignmentOutcome) -> Option<RedistributionHistoryItem> {
        None
    }
}

pub struct AssignmentService {
    store: Arc<dyn QueueStore>,
    locks: DashMap<QueueId, Arc<Mutex<()>>>,
    max_retries: u32,
    overflow_enabled: bool,
}

impl AssignmentService {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            max_retries: 3,
            overflow_enabled: true,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_overflow(mut self, enabled: bool) -> Self {
        self.overflow_enabled = enabled;
        self
    }

    fn lock_for(&self, queue_id: &QueueId) -> Arc<Mutex<()>> {
        self.locks
            .entry(queue_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Assign the next broker from `queue_id`, spilling over once to the
    /// queue's overflow queue when nobody is eligible.
    pub async fn assign(
        &self,
        queue_id: &QueueId,
        now: DateTime<Utc>,
        recorder: &dyn AssignmentRecorder,
    ) -> Result<AssignmentOutcome, LeadflowError> {
        let overflow = match self.assign_in(queue_id, None, now, recorder).await {
            Err(LeadflowError::NoEligibleAgent { .. }) if self.overflow_enabled => {
                self.overflow_target(queue_id).await?
            }
            result => return result,
        };
        match overflow {
            Some(target) => {
                info!(queue_id = %queue_id, overflow_queue = %target, "no eligible agent, trying overflow queue");
                self.assign_in(&target, Some(queue_id), now, recorder).await
            }
            None => Err(LeadflowError::NoEligibleAgent {
                queue_id: queue_id.to_string(),
            }),
        }
    }

    async fn overflow_target(&self, queue_id: &QueueId) -> Result<Option<QueueId>, LeadflowError> {
        let queue = self.load(queue_id).await?;
        Ok(queue
            .advanced
            .overflow_queue_id
            .filter(|target| target != queue_id))
    }

    async fn load(&self, queue_id: &QueueId) -> Result<leadflow_core::model::Queue, LeadflowError> {
        self.store
            .get_queue(queue_id)
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "queue",
                id: queue_id.to_string(),
            })
    }

    async fn assign_in(
        &self,
        queue_id: &QueueId,
        overflowed_from: Option<&QueueId>,
        now: DateTime<Utc>,
        recorder: &dyn AssignmentRecorder,
    ) -> Result<AssignmentOutcome, LeadflowError> {
        let lock = self.lock_for(queue_id);
        let _guard = lock.lock().await;

        let mut picked: Option<AgentId> = None;
        for attempt in 0..=self.max_retries {
            let mut queue = self.load(queue_id).await?;
            let mut outcome = AssignmentOutcome {
                queue_id: queue_id.clone(),
                agent_id: AgentId::default(),
                overflowed_from: overflowed_from.cloned(),
                queue_version: queue.version,
            };

            // After a lost write, keep the earlier pick while it is still
            // eligible so a concurrent edit does not skip a broker.
            match picked.as_ref() {
                Some(agent) if QueueAssignor::is_eligible(&queue, agent, now) => {
                    QueueAssignor::apply(&mut queue, agent);
                    outcome.agent_id = agent.clone();
                }
                _ => {
                    let agent = match QueueAssignor::assign(&mut queue, now) {
                        Ok(agent) => agent,
                        Err(err) => {
                            metrics::record_assignment(queue_id.as_str(), "no-eligible-agent");
                            return Err(err);
                        }
                    };
                    outcome.agent_id = agent.clone();
                    picked = Some(agent);
                }
            }

            let entry = recorder.entry(&outcome);
            match self.store.commit_assignment(&queue, entry.as_ref()).await {
                Ok(version) => {
                    if let Some(entry) = &entry {
                        recorder.committed(entry);
                    }
                    outcome.queue_version = version;
                    metrics::record_assignment(queue_id.as_str(), "assigned");
                    metrics::record_attempts(attempt + 1);
                    info!(
                        queue_id = %queue_id,
                        agent_id = %outcome.agent_id,
                        overflow = overflowed_from.is_some(),
                        "lead assigned"
                    );
                    return Ok(outcome);
                }
                Err(LeadflowError::Conflict { .. }) => {
                    metrics::record_conflict(queue_id.as_str());
                    warn!(queue_id = %queue_id, attempt, "queue changed during assignment, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        metrics::record_assignment(queue_id.as_str(), "conflict");
        Err(LeadflowError::Conflict {
            entity: "queue",
            id: queue_id.to_string(),
        })
    }

    /// Free one unit of capacity for `agent_id` in `queue_id`.
    pub async fn release(&self, queue_id: &QueueId, agent_id: &AgentId) -> Result<(), LeadflowError> {
        let lock = self.lock_for(queue_id);
        let _guard = lock.lock().await;
        for _ in 0..=self.max_retries {
            let mut queue = self.load(queue_id).await?;
            QueueAssignor::release(&mut queue, agent_id);
            match self.store.save_queue_state(&queue).await {
                Ok(_) => {
                    debug!(queue_id = %queue_id, agent_id = %agent_id, "capacity released");
                    return Ok(());
                }
                Err(LeadflowError::Conflict { .. }) => metrics::record_conflict(queue_id.as_str()),
                Err(err) => return Err(err),
            }
        }
        Err(LeadflowError::Conflict {
            entity: "queue",
            id: queue_id.to_string(),
        })
    }
}
