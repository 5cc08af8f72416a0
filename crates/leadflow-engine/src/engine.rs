// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine: lead ingestion, cadence commands, redistribution, and the
//! tick that advances due instances.
//!
//! Every instance command runs under that instance's lock, persists the
//! transition, then dispatches its effects. Attaching cadences and changing
//! a lead's [`LeadState`] run under the lead's lock, so one event cannot
//! open the same cadence twice or assign the lead twice. Open instances are
//! brought in line with a new assignment after the lead lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use leadflow_audit::RedistributionAuditLog;
use leadflow_cadence::{
    AttemptVerdict, CadenceScheduler, EscalationDecision, OutcomeFlags, RoutedOutcome,
    SchedulerEffects, attachable_cadences,
};
use leadflow_config::LeadflowConfig;
use leadflow_core::model::{
    AttemptResult, Cadence, CadenceInstance, LeadState, OperationType, PendingRedistribution,
    Queue, Responsible,
};
use leadflow_core::traits::Collaborators;
use leadflow_core::validation::validate_definitions;
use leadflow_core::{
    AgentId, Assignment, CadenceId, Channel, DurationSpec, InstanceId, LeadEvent, LeadId,
    LeadRecord, LeadflowError, QueueId, Stores,
};
use leadflow_router::{AssignmentOutcome, AssignmentService, QueueAssignor};
use leadflow_rules::RuleEngine;
use tracing::{debug, error, info, warn};

use crate::effects::settle;
use crate::locks::{KeyedLocks, instance_key, lead_key};
use crate::metrics;
use crate::recorder::{AuditRecorder, context_from_record};
use crate::report::{
    CommandReport, DispatchSummary, Distribution, EventReport, ImportReport, InstanceFailure,
    RedistributionReport, RoutePreview, TickReport,
};

const NEW_LEAD_REASON: &str = "new lead";

/// Tunables taken from [`LeadflowConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_retries: u32,
    pub overflow_enabled: bool,
    pub audit_enabled: bool,
    pub max_parallel_instances: usize,
    /// Applied on import to steps declared without a deadline.
    pub default_step_deadline: DurationSpec,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&LeadflowConfig::default())
    }
}

impl From<&LeadflowConfig> for EngineSettings {
    fn from(config: &LeadflowConfig) -> Self {
        Self {
            max_retries: config.assignment.max_retries,
            overflow_enabled: config.assignment.overflow_enabled,
            audit_enabled: config.audit.enabled,
            max_parallel_instances: config.scheduler.max_parallel_instances,
            default_step_deadline: config.scheduler.default_step_deadline,
        }
    }
}

/// A reassignment requested by a user or an integration.
#[derive(Debug, Clone)]
pub struct RedistributionRequest {
    pub lead_id: LeadId,
    /// Current CRM record, read for audit dimensions.
    pub record: LeadRecord,
    /// Queue to assign from; defaults to the lead's current queue, then the
    /// primary queue.
    pub target_queue: Option<QueueId>,
    pub operation: OperationType,
    pub reason: String,
    pub responsible: Responsible,
}

impl RedistributionRequest {
    pub fn new(lead_id: impl Into<LeadId>, reason: impl Into<String>) -> Self {
        Self {
            lead_id: lead_id.into(),
            record: LeadRecord::new(),
            target_queue: None,
            operation: OperationType::Redistribution,
            reason: reason.into(),
            responsible: Responsible::System,
        }
    }

    pub fn to_queue(mut self, queue_id: impl Into<QueueId>) -> Self {
        self.target_queue = Some(queue_id.into());
        self
    }

    pub fn by_user(mut self, user: impl Into<AgentId>) -> Self {
        self.responsible = Responsible::User(user.into());
        self
    }

    pub fn operation(mut self, operation: OperationType) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_record(mut self, record: LeadRecord) -> Self {
        self.record = record;
        self
    }
}

/// One reassignment as executed internally. The source queue and previous
/// broker come from the lead's [`LeadState`].
pub(crate) struct Reassignment<'r> {
    pub(crate) record: Option<&'r LeadRecord>,
    pub(crate) queue_id: QueueId,
    pub(crate) operation: OperationType,
    pub(crate) reason: &'r str,
    pub(crate) responsible: Responsible,
}

impl<'r> Reassignment<'r> {
    /// Retry of a redistribution that found nobody eligible.
    fn pending(pending: &'r PendingRedistribution, record: Option<&'r LeadRecord>) -> Self {
        Self {
            record,
            queue_id: pending.queue_id.clone(),
            operation: pending.operation,
            reason: &pending.reason,
            responsible: pending.responsible.clone(),
        }
    }

    /// Deferred form of this request.
    pub(crate) fn defer(&self, now: DateTime<Utc>) -> PendingRedistribution {
        PendingRedistribution {
            queue_id: self.queue_id.clone(),
            operation: self.operation,
            reason: self.reason.to_string(),
            responsible: self.responsible.clone(),
            requested_at: now,
        }
    }
}

pub struct Engine {
    pub(crate) stores: Stores,
    pub(crate) assignment: AssignmentService,
    pub(crate) audit: RedistributionAuditLog,
    pub(crate) collaborators: Arc<dyn Collaborators>,
    pub(crate) rules: RuleEngine,
    pub(crate) locks: KeyedLocks,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(stores: Stores, collaborators: Arc<dyn Collaborators>) -> Self {
        Self::with_settings(stores, collaborators, EngineSettings::default())
    }

    pub fn with_settings(
        stores: Stores,
        collaborators: Arc<dyn Collaborators>,
        settings: EngineSettings,
    ) -> Self {
        let assignment = AssignmentService::new(stores.queues.clone())
            .with_max_retries(settings.max_retries)
            .with_overflow(settings.overflow_enabled);
        let audit =
            RedistributionAuditLog::new(stores.audit.clone()).with_enabled(settings.audit_enabled);
        Self {
            stores,
            assignment,
            audit,
            collaborators,
            rules: RuleEngine::new(),
            locks: KeyedLocks::new(),
            settings,
        }
    }

    pub fn from_config(
        config: &LeadflowConfig,
        stores: Stores,
        collaborators: Arc<dyn Collaborators>,
    ) -> Self {
        Self::with_settings(stores, collaborators, EngineSettings::from(config))
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn audit(&self) -> &RedistributionAuditLog {
        &self.audit
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // --- Definitions ---

    /// Validate and store a batch of definitions. Nothing is stored when any
    /// definition is invalid.
    pub async fn import_definitions(
        &self,
        queues: Vec<Queue>,
        mut cadences: Vec<Cadence>,
    ) -> Result<ImportReport, LeadflowError> {
        for step in cadences.iter_mut().flat_map(|c| c.steps.iter_mut()) {
            if step.deadline.is_zero() {
                step.deadline = self.settings.default_step_deadline;
            }
        }
        // Cross-references may point at definitions stored by earlier imports.
        let mut all_queues = self.stores.queues.list_queues().await?;
        all_queues.retain(|stored| !queues.iter().any(|q| q.id == stored.id));
        all_queues.extend(queues.iter().cloned());
        let mut all_cadences = self.stores.cadences.list_cadences().await?;
        all_cadences.retain(|stored| !cadences.iter().any(|c| c.id == stored.id));
        all_cadences.extend(cadences.iter().cloned());
        validate_definitions(&all_queues, &all_cadences)?;

        for queue in &queues {
            self.stores.queues.put_queue(queue).await?;
        }
        for cadence in &cadences {
            self.stores.cadences.put_cadence(cadence).await?;
        }
        info!(
            queues = queues.len(),
            cadences = cadences.len(),
            "definitions imported"
        );
        Ok(ImportReport {
            queues: queues.len(),
            cadences: cadences.len(),
        })
    }

    // --- Lead ingestion ---

    /// Distribute the lead if it has no broker yet, retry a pending
    /// redistribution, and attach every cadence the event qualifies for.
    pub async fn handle_event(&self, event: &LeadEvent) -> Result<EventReport, LeadflowError> {
        let guard = self.locks.lock(lead_key(&event.lead_id)).await;
        let report = self.ingest(event).await?;
        drop(guard);
        if report.dispatch.assigned_to.is_some() {
            self.sync_instances(&event.lead_id, event.occurred_at).await?;
        }
        Ok(report)
    }

    async fn ingest(&self, event: &LeadEvent) -> Result<EventReport, LeadflowError> {
        let mut report = EventReport::new(event.lead_id.clone());
        let mut state = self.lead_state(&event.lead_id, event.occurred_at).await?;

        if !state.is_assigned() {
            report.distribution = self
                .distribute(event, &mut state, &mut report.dispatch)
                .await?;
        } else if let Some(pending) = state.pending.clone() {
            let request = Reassignment::pending(&pending, Some(&event.record));
            let result = self
                .reassign(&mut state, request, event.occurred_at, &mut report.dispatch)
                .await;
            report.distribution = match result {
                Ok(outcome) => {
                    self.stores.leads.put_lead(&state).await?;
                    outcome.into()
                }
                Err(LeadflowError::NoEligibleAgent { .. }) => {
                    debug!(lead_id = %event.lead_id, queue_id = %pending.queue_id, "pending redistribution still has nobody eligible");
                    Distribution::NoEligibleAgent {
                        queue_id: pending.queue_id.clone(),
                    }
                }
                Err(err) => return Err(err),
            };
        }

        let cadences = self.stores.cadences.list_cadences().await?;
        let attachable = attachable_cadences(&self.rules, &cadences, event);
        if attachable.is_empty() {
            debug!(lead_id = %event.lead_id, "no cadence attached");
            return Ok(report);
        }

        let existing = self
            .stores
            .instances
            .instances_for_lead(&event.lead_id)
            .await?;
        for cadence in attachable {
            if existing
                .iter()
                .any(|i| i.cadence_id == cadence.id && i.is_open())
            {
                debug!(lead_id = %event.lead_id, cadence_id = %cadence.id, "cadence already open");
                report.skipped.push(cadence.id.clone());
                continue;
            }
            let (instance, summary) = self
                .start_instance(
                    cadence,
                    &event.lead_id,
                    state.queue_id.clone(),
                    state.agent_id.clone(),
                    event.occurred_at,
                )
                .await?;
            report.started.push(instance.id);
            report.dispatch.absorb(summary);
        }
        Ok(report)
    }

    /// Route an unassigned lead by its record. When the matched queue has
    /// nobody eligible the assignment is left pending for the next event or
    /// tick.
    async fn distribute(
        &self,
        event: &LeadEvent,
        state: &mut LeadState,
        summary: &mut DispatchSummary,
    ) -> Result<Distribution, LeadflowError> {
        let queues = self.stores.queues.list_queues().await?;
        let Some(queue) = self.rules.first_match(&event.record, &queues) else {
            info!(lead_id = %event.lead_id, "no queue matched, lead left unassigned");
            metrics::record_lead("unrouted");
            return Ok(Distribution::Unrouted);
        };

        let request = Reassignment {
            record: Some(&event.record),
            queue_id: queue.id.clone(),
            operation: OperationType::Distribution,
            reason: NEW_LEAD_REASON,
            responsible: Responsible::System,
        };
        let pending = request.defer(event.occurred_at);
        let result = self
            .reassign(state, request, event.occurred_at, summary)
            .await;
        match result {
            Ok(outcome) => {
                metrics::record_lead("assigned");
                self.stores.leads.put_lead(state).await?;
                Ok(outcome.into())
            }
            Err(LeadflowError::NoEligibleAgent { .. }) => {
                warn!(lead_id = %event.lead_id, queue_id = %queue.id, "no eligible agent");
                metrics::record_lead("no-eligible-agent");
                state.defer(pending);
                self.stores.leads.put_lead(state).await?;
                Ok(Distribution::NoEligibleAgent {
                    queue_id: queue.id.clone(),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// The lead's stored assignment record, or an empty one.
    pub(crate) async fn lead_state(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<LeadState, LeadflowError> {
        Ok(self
            .stores
            .leads
            .get_lead(lead_id)
            .await?
            .unwrap_or_else(|| LeadState::new(lead_id.clone(), now)))
    }

    pub async fn lead(&self, lead_id: &LeadId) -> Result<Option<LeadState>, LeadflowError> {
        self.stores.leads.get_lead(lead_id).await
    }

    /// Queue and next broker for `record`, leaving rotation state untouched.
    pub async fn preview_route(
        &self,
        record: &LeadRecord,
        now: DateTime<Utc>,
    ) -> Result<RoutePreview, LeadflowError> {
        let queues = self.stores.queues.list_queues().await?;
        let Some(queue) = self.rules.first_match(record, &queues) else {
            return Ok(RoutePreview {
                queue_id: None,
                agent_id: None,
            });
        };
        Ok(RoutePreview {
            queue_id: Some(queue.id.clone()),
            agent_id: QueueAssignor::select(queue, now).ok(),
        })
    }

    pub(crate) async fn start_instance(
        &self,
        cadence: &Cadence,
        lead_id: &LeadId,
        queue_id: Option<QueueId>,
        agent_id: Option<AgentId>,
        now: DateTime<Utc>,
    ) -> Result<(CadenceInstance, DispatchSummary), LeadflowError> {
        let (mut instance, effects) = CadenceScheduler::new(cadence).start(lead_id.clone(), now);
        instance.queue_id = queue_id;
        instance.agent_id = agent_id;
        metrics::record_cadence_started(cadence.id.as_str());
        // Starting only activates a step or completes, so there is no
        // follow-up cadence to open here.
        let (summary, _) = self.persist_and_dispatch(&mut instance, cadence, effects, now).await?;
        Ok((instance, summary))
    }

    // --- Instance commands ---

    /// Record a contact attempt on an instance.
    pub async fn record_attempt(
        &self,
        instance_id: &InstanceId,
        channel: Channel,
        result: AttemptResult,
        now: DateTime<Utc>,
    ) -> Result<CommandReport<AttemptVerdict>, LeadflowError> {
        let guard = self.locks.lock(instance_key(instance_id)).await;
        let (mut instance, cadence) = self.load(instance_id).await?;
        let (verdict, effects) =
            CadenceScheduler::new(&cadence).record_attempt(&mut instance, channel, result, now)?;
        let dispatch = self.finish(&mut instance, &cadence, effects, now).await?;
        drop(guard);
        self.after_command(&instance, &dispatch, now).await?;
        Ok(CommandReport {
            value: verdict,
            instance,
            dispatch,
        })
    }

    /// Apply recorded outcome flags through the cadence's outcome rules.
    pub async fn apply_outcome(
        &self,
        instance_id: &InstanceId,
        flags: &OutcomeFlags,
        now: DateTime<Utc>,
    ) -> Result<CommandReport<Option<RoutedOutcome>>, LeadflowError> {
        let guard = self.locks.lock(instance_key(instance_id)).await;
        let (mut instance, cadence) = self.load(instance_id).await?;
        let (routed, effects) =
            CadenceScheduler::new(&cadence).apply_outcome(&mut instance, flags, now)?;
        let dispatch = self.finish(&mut instance, &cadence, effects, now).await?;
        drop(guard);
        self.after_command(&instance, &dispatch, now).await?;
        Ok(CommandReport {
            value: routed,
            instance,
            dispatch,
        })
    }

    /// Check the attempt threshold now instead of waiting for the deadline.
    ///
    /// Returns [`LeadflowError::EscalationAlreadyHandled`] once the
    /// instance's escalation has fired.
    pub async fn check_escalation(
        &self,
        instance_id: &InstanceId,
        now: DateTime<Utc>,
    ) -> Result<CommandReport<EscalationDecision>, LeadflowError> {
        let guard = self.locks.lock(instance_key(instance_id)).await;
        let (mut instance, cadence) = self.load(instance_id).await?;
        let (decision, effects) =
            CadenceScheduler::new(&cadence).check_escalation(&mut instance, now)?;
        let dispatch = self.finish(&mut instance, &cadence, effects, now).await?;
        drop(guard);
        self.after_command(&instance, &dispatch, now).await?;
        Ok(CommandReport {
            value: decision,
            instance,
            dispatch,
        })
    }

    pub async fn resume(
        &self,
        instance_id: &InstanceId,
        now: DateTime<Utc>,
    ) -> Result<CommandReport<()>, LeadflowError> {
        let guard = self.locks.lock(instance_key(instance_id)).await;
        let (mut instance, cadence) = self.load(instance_id).await?;
        let effects = CadenceScheduler::new(&cadence).resume(&mut instance, now)?;
        let dispatch = self.finish(&mut instance, &cadence, effects, now).await?;
        drop(guard);
        self.after_command(&instance, &dispatch, now).await?;
        Ok(CommandReport {
            value: (),
            instance,
            dispatch,
        })
    }

    /// Reset attempts and the escalation latch and re-enter the first step.
    pub async fn restart(
        &self,
        instance_id: &InstanceId,
        now: DateTime<Utc>,
    ) -> Result<CommandReport<()>, LeadflowError> {
        let guard = self.locks.lock(instance_key(instance_id)).await;
        let (mut instance, cadence) = self.load(instance_id).await?;
        let effects = CadenceScheduler::new(&cadence).restart(&mut instance, now);
        let dispatch = self.finish(&mut instance, &cadence, effects, now).await?;
        drop(guard);
        self.after_command(&instance, &dispatch, now).await?;
        Ok(CommandReport {
            value: (),
            instance,
            dispatch,
        })
    }

    pub async fn instances_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<CadenceInstance>, LeadflowError> {
        self.stores.instances.instances_for_lead(lead_id).await
    }

    async fn load(&self, instance_id: &InstanceId) -> Result<(CadenceInstance, Cadence), LeadflowError> {
        let instance = self
            .stores
            .instances
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "cadence instance",
                id: instance_id.to_string(),
            })?;
        let cadence = self
            .stores
            .cadences
            .get_cadence(&instance.cadence_id)
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "cadence",
                id: instance.cadence_id.to_string(),
            })?;
        Ok((instance, cadence))
    }

    /// Bring the lead's other open instances in line after a transition
    /// reassigned it. Runs without the instance lock held.
    async fn after_command(
        &self,
        instance: &CadenceInstance,
        dispatch: &DispatchSummary,
        now: DateTime<Utc>,
    ) -> Result<(), LeadflowError> {
        if dispatch.assigned_to.is_some() {
            self.sync_instances(&instance.lead_id, now).await?;
        }
        Ok(())
    }

    /// Point every open instance of `lead_id` at the lead's current queue
    /// and broker. Returns the open instances, changed or not.
    ///
    /// Takes each instance lock in turn; the caller must hold no lock.
    pub(crate) async fn sync_instances(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<Vec<InstanceId>, LeadflowError> {
        let Some(state) = self.stores.leads.get_lead(lead_id).await? else {
            return Ok(Vec::new());
        };
        if !state.is_assigned() {
            return Ok(Vec::new());
        }

        let mut synced = Vec::new();
        let instances = self.stores.instances.instances_for_lead(lead_id).await?;
        for open in instances.iter().filter(|i| i.is_open()) {
            let _guard = self.locks.lock(instance_key(&open.id)).await;
            let Some(mut instance) = self.stores.instances.get_instance(&open.id).await? else {
                continue;
            };
            if !instance.is_open() {
                continue;
            }
            if instance.queue_id != state.queue_id || instance.agent_id != state.agent_id {
                instance.queue_id = state.queue_id.clone();
                instance.agent_id = state.agent_id.clone();
                instance.updated_at = now;
                self.stores.instances.put_instance(&instance).await?;
                debug!(instance_id = %instance.id, lead_id = %lead_id, "instance reassigned");
            }
            synced.push(instance.id);
        }
        Ok(synced)
    }

    /// Persist, dispatch, and open a follow-up cadence if one was requested.
    async fn finish(
        &self,
        instance: &mut CadenceInstance,
        cadence: &Cadence,
        effects: SchedulerEffects,
        now: DateTime<Utc>,
    ) -> Result<DispatchSummary, LeadflowError> {
        let (mut summary, follow_up) = self
            .persist_and_dispatch(instance, cadence, effects, now)
            .await?;
        if let Some(cadence_id) = follow_up {
            self.start_follow_up(instance, &cadence_id, now, &mut summary)
                .await?;
        }
        Ok(summary)
    }

    async fn persist_and_dispatch(
        &self,
        instance: &mut CadenceInstance,
        cadence: &Cadence,
        effects: SchedulerEffects,
        now: DateTime<Utc>,
    ) -> Result<(DispatchSummary, Option<CadenceId>), LeadflowError> {
        // Effects go to the lead's current broker even when this instance
        // has not been synced yet.
        if let Some(state) = self.stores.leads.get_lead(&instance.lead_id).await? {
            if state.is_assigned() {
                instance.queue_id = state.queue_id;
                instance.agent_id = state.agent_id;
            }
        }
        self.stores.instances.put_instance(instance).await?;

        let assigned = (instance.queue_id.clone(), instance.agent_id.clone());
        let mut summary = DispatchSummary::default();
        let follow_up = self
            .dispatch(instance, cadence, effects, now, &mut summary)
            .await?;
        if (&instance.queue_id, &instance.agent_id) != (&assigned.0, &assigned.1) {
            self.stores.instances.put_instance(instance).await?;
        }
        Ok((summary, follow_up))
    }

    async fn start_follow_up(
        &self,
        from: &CadenceInstance,
        cadence_id: &CadenceId,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) -> Result<(), LeadflowError> {
        let _guard = self.locks.lock(lead_key(&from.lead_id)).await;
        let cadence = match self.stores.cadences.get_cadence(cadence_id).await? {
            Some(cadence) if cadence.active => cadence,
            _ => {
                warn!(lead_id = %from.lead_id, cadence_id = %cadence_id, "follow-up cadence missing or inactive");
                summary
                    .errors
                    .push(format!("follow-up cadence {cadence_id} is missing or inactive"));
                return Ok(());
            }
        };
        let open = self
            .stores
            .instances
            .instances_for_lead(&from.lead_id)
            .await?
            .into_iter()
            .any(|i| i.cadence_id == *cadence_id && i.is_open());
        if open {
            debug!(lead_id = %from.lead_id, cadence_id = %cadence_id, "follow-up cadence already open");
            return Ok(());
        }

        let (instance, started) = self
            .start_instance(
                &cadence,
                &from.lead_id,
                from.queue_id.clone(),
                from.agent_id.clone(),
                now,
            )
            .await?;
        info!(from = %from.id, to = %instance.id, cadence_id = %cadence_id, "moved to follow-up cadence");
        summary.absorb(started);
        summary.follow_up = Some(instance.id);
        Ok(())
    }

    // --- Redistribution ---

    /// Reassign a lead and point its open instances at the new broker.
    pub async fn redistribute(
        &self,
        request: RedistributionRequest,
        now: DateTime<Utc>,
    ) -> Result<RedistributionReport, LeadflowError> {
        let guard = self.locks.lock(lead_key(&request.lead_id)).await;
        let mut state = self.lead_state(&request.lead_id, now).await?;
        let previous_agent_id = state.agent_id.clone();

        let queue_id = match request.target_queue.clone().or_else(|| state.queue_id.clone()) {
            Some(queue_id) => queue_id,
            None => self
                .primary_queue()
                .await?
                .map(|q| q.id)
                .ok_or_else(|| {
                    LeadflowError::validation(format!(
                        "no target queue for lead {}",
                        request.lead_id
                    ))
                })?,
        };

        let mut dispatch = DispatchSummary::default();
        let outcome = self
            .reassign(
                &mut state,
                Reassignment {
                    record: Some(&request.record),
                    queue_id,
                    operation: request.operation,
                    reason: &request.reason,
                    responsible: request.responsible.clone(),
                },
                now,
                &mut dispatch,
            )
            .await?;
        self.stores.leads.put_lead(&state).await?;
        drop(guard);

        let updated_instances = self.sync_instances(&request.lead_id, now).await?;
        info!(
            lead_id = %request.lead_id,
            agent_id = %outcome.agent_id,
            instances = updated_instances.len(),
            "lead redistributed"
        );
        Ok(RedistributionReport {
            queue_id: outcome.queue_id,
            agent_id: outcome.agent_id,
            previous_agent_id,
            updated_instances,
            dispatch,
        })
    }

    /// Assign from `request.queue_id`, release the previous broker's slot,
    /// record the new assignment on `state`, and notify. The caller holds the
    /// lead lock and stores `state`.
    pub(crate) async fn reassign(
        &self,
        state: &mut LeadState,
        request: Reassignment<'_>,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) -> Result<AssignmentOutcome, LeadflowError> {
        let empty = LeadRecord::new();
        let mut template = context_from_record(
            &state.lead_id,
            request.record.unwrap_or(&empty),
            request.operation,
            request.reason,
            now,
        );
        template.responsible = request.responsible;
        template.previous_broker = state.agent_id.clone();
        template.source_queue = state.queue_id.clone();
        template.previously_assigned_at = state.assigned_at;

        let recorder = AuditRecorder::new(&self.audit, template);
        let outcome = self
            .assignment
            .assign(&request.queue_id, now, &recorder)
            .await?;

        if let (Some(queue_id), Some(agent_id)) = (&state.queue_id, &state.agent_id) {
            if let Err(err) = self.assignment.release(queue_id, agent_id).await {
                if err.is_fatal() {
                    return Err(err);
                }
                warn!(queue_id = %queue_id, agent_id = %agent_id, error = %err, "could not release previous broker");
            }
        }

        let previous_agent_id = state.agent_id.take();
        state.assign(outcome.queue_id.clone(), outcome.agent_id.clone(), now);
        summary.assigned_to = Some(outcome.agent_id.clone());

        let assignment = Assignment {
            lead_id: state.lead_id.clone(),
            queue_id: outcome.queue_id.clone(),
            agent_id: outcome.agent_id.clone(),
            previous_agent_id,
            assigned_at: now,
        };
        let result = self.collaborators.notify_assignment(&assignment).await;
        settle(summary, "notify_assignment", result)?;
        Ok(outcome)
    }

    /// Retry the pending redistribution of `lead_id`. Returns `None` when
    /// nothing was pending or nobody is eligible yet.
    async fn retry_pending(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<Option<DispatchSummary>, LeadflowError> {
        let guard = self.locks.lock(lead_key(lead_id)).await;
        let Some(mut state) = self.stores.leads.get_lead(lead_id).await? else {
            return Ok(None);
        };
        let Some(pending) = state.pending.clone() else {
            return Ok(None);
        };

        let mut summary = DispatchSummary::default();
        let request = Reassignment::pending(&pending, None);
        let result = self.reassign(&mut state, request, now, &mut summary).await;
        match result {
            Ok(outcome) => {
                self.stores.leads.put_lead(&state).await?;
                info!(lead_id = %lead_id, agent_id = %outcome.agent_id, operation = %pending.operation, "pending redistribution completed");
            }
            Err(LeadflowError::NoEligibleAgent { .. }) => return Ok(None),
            Err(err) => return Err(err),
        }
        drop(guard);

        self.sync_instances(lead_id, now).await?;
        Ok(Some(summary))
    }

    pub(crate) async fn primary_queue(&self) -> Result<Option<Queue>, LeadflowError> {
        Ok(self
            .stores
            .queues
            .list_queues()
            .await?
            .into_iter()
            .find(|q| q.advanced.primary))
    }

    // --- Timer ---

    /// Advance every instance whose deadline, reminder, or visit date is due.
    ///
    /// Instances run concurrently in chunks of `max_parallel_instances`. A
    /// failing instance is logged and reported; the rest still advance.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, LeadflowError> {
        let pending = self.stores.leads.pending_leads().await?;
        let mut reassigned = Vec::new();
        for lead in &pending {
            match self.retry_pending(&lead.lead_id, now).await {
                Ok(Some(summary)) => reassigned.push(summary),
                Ok(None) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!(lead_id = %lead.lead_id, error = %err, "pending redistribution failed");
                    reassigned.push(DispatchSummary {
                        errors: vec![format!("redistribute {}: {err}", lead.lead_id)],
                        ..DispatchSummary::default()
                    });
                }
            }
        }

        let instances = self.stores.instances.schedulable_instances().await?;
        let cadences: HashMap<CadenceId, Cadence> = self
            .stores
            .cadences
            .list_cadences()
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut report = TickReport::new(now, instances.len());
        for summary in reassigned {
            if summary.assigned_to.is_some() {
                report.reassigned += 1;
            }
            report.dispatched += summary.dispatched;
            report.dispatch_errors.extend(summary.errors);
        }
        let chunk_size = self.settings.max_parallel_instances.max(1);
        for chunk in instances.chunks(chunk_size) {
            let results = join_all(
                chunk
                    .iter()
                    .map(|instance| self.tick_instance(&instance.id, &cadences, now)),
            )
            .await;
            for (instance, result) in chunk.iter().zip(results) {
                match result {
                    Ok(Some(summary)) => {
                        report.advanced += 1;
                        report.dispatched += summary.dispatched;
                        report.dispatch_errors.extend(summary.errors);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        error!(instance_id = %instance.id, error = %err, "instance failed during tick");
                        report.failures.push(InstanceFailure {
                            instance_id: instance.id.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
        self.locks.prune();

        metrics::record_tick_failures(report.failures.len());
        info!(
            examined = report.examined,
            advanced = report.advanced,
            reassigned = report.reassigned,
            failures = report.failures.len(),
            "tick finished"
        );
        Ok(report)
    }

    async fn tick_instance(
        &self,
        instance_id: &InstanceId,
        cadences: &HashMap<CadenceId, Cadence>,
        now: DateTime<Utc>,
    ) -> Result<Option<DispatchSummary>, LeadflowError> {
        let guard = self.locks.lock(instance_key(instance_id)).await;
        // Re-read under the lock: a command may have moved it since listing.
        let Some(mut instance) = self.stores.instances.get_instance(instance_id).await? else {
            return Ok(None);
        };
        if !instance.is_schedulable() {
            return Ok(None);
        }
        let cadence = cadences
            .get(&instance.cadence_id)
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "cadence",
                id: instance.cadence_id.to_string(),
            })?;
        let effects = CadenceScheduler::new(cadence).advance_if_due(&mut instance, now);
        if effects.is_empty() {
            return Ok(None);
        }
        let dispatch = self.finish(&mut instance, cadence, effects, now).await?;
        drop(guard);
        self.after_command(&instance, &dispatch, now).await?;
        Ok(Some(dispatch))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use leadflow_core::model::{
        AttemptPolicy, AuditFilter, CadenceTrigger, OutcomeAction, OutcomeRules,
        PostFailureAction, QueueMember, Rule, RuleOperator, Step,
    };
    use leadflow_core::{LeadEventKind, ManagerTask, RetryReminder, StepDispatch};
    use leadflow_storage::MemoryStorage;
    use tracing_test::traced_test;

    use super::*;

    #[derive(Default)]
    struct Calls {
        log: StdMutex<Vec<String>>,
        fail_steps: bool,
    }

    impl Calls {
        fn push(&self, call: String) {
            self.log.lock().unwrap().push(call);
        }

        fn named(&self, prefix: &str) -> Vec<String> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl Collaborators for Calls {
        async fn dispatch_step(&self, dispatch: &StepDispatch) -> Result<(), LeadflowError> {
            if self.fail_steps {
                return Err(LeadflowError::Collaborator {
                    message: "outreach down".into(),
                    source: None,
                });
            }
            self.push(format!("step:{}", dispatch.step_id));
            Ok(())
        }
        async fn remind_retry(&self, reminder: &RetryReminder) -> Result<(), LeadflowError> {
            self.push(format!("remind:{}", reminder.counted_attempts));
            Ok(())
        }
        async fn create_manager_task(&self, task: &ManagerTask) -> Result<(), LeadflowError> {
            self.push(format!("task:{}", task.lead_id));
            Ok(())
        }
        async fn discard_lead(&self, lead_id: &LeadId, _reason: &str) -> Result<(), LeadflowError> {
            self.push(format!("discard:{lead_id}"));
            Ok(())
        }
        async fn move_to_queue(
            &self,
            lead_id: &LeadId,
            queue_id: Option<&QueueId>,
        ) -> Result<(), LeadflowError> {
            let queue = queue_id.map(|q| q.to_string()).unwrap_or_default();
            self.push(format!("move:{lead_id}:{queue}"));
            Ok(())
        }
        async fn start_post_sale(&self, lead_id: &LeadId, days: u32) -> Result<(), LeadflowError> {
            self.push(format!("post-sale:{lead_id}:{days}"));
            Ok(())
        }
        async fn notify_assignment(&self, assignment: &Assignment) -> Result<(), LeadflowError> {
            self.push(format!("assign:{}:{}", assignment.lead_id, assignment.agent_id));
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn site_rule() -> Rule {
        Rule::new("origem", RuleOperator::Equals, "Site")
    }

    fn site_queue() -> Queue {
        let mut queue = Queue::new("site", "Site")
            .with_rule(site_rule())
            .with_member(QueueMember::new("ana"))
            .with_member(QueueMember::new("bruno"));
        queue.advanced.primary = true;
        queue
    }

    fn welcome(outcomes: OutcomeRules) -> Cadence {
        Cadence::new("boas-vindas", "Boas-vindas", CadenceTrigger::NewLead)
            .with_entry_rule(site_rule())
            .with_step(Step::new("whats", Channel::Whatsapp, DurationSpec::hours(1)))
            .with_step(Step::new("ligar", Channel::Call, DurationSpec::hours(4)))
            .with_outcomes(outcomes)
    }

    fn follow_up() -> Cadence {
        Cadence::new("nutricao", "Nutrição", CadenceTrigger::Manual)
            .with_entry_rule(site_rule())
            .with_step(Step::new("email", Channel::Email, DurationSpec::days(2)))
    }

    async fn engine(calls: Arc<Calls>, cadences: Vec<Cadence>) -> Engine {
        let engine = Engine::new(Stores::new(Arc::new(MemoryStorage::new())), calls);
        engine
            .import_definitions(vec![site_queue()], cadences)
            .await
            .unwrap();
        engine
    }

    fn new_lead(id: &str, origem: &str) -> LeadEvent {
        LeadEvent::new(
            id,
            LeadEventKind::Created,
            LeadRecord::new().with("origem", origem),
        )
        .at(t0())
    }

    #[tokio::test]
    async fn new_lead_is_assigned_and_cadence_started() {
        let calls = Arc::new(Calls::default());
        let engine = engine(calls.clone(), vec![welcome(OutcomeRules::default())]).await;

        let report = engine.handle_event(&new_lead("l1", "Site")).await.unwrap();
        assert_eq!(report.distribution.agent_id(), Some(&AgentId::from("ana")));
        assert_eq!(report.started.len(), 1);
        assert_eq!(calls.named("assign"), vec!["assign:l1:ana".to_string()]);
        assert_eq!(calls.named("step"), vec!["step:whats".to_string()]);

        let instances = engine.instances_for_lead(&"l1".into()).await.unwrap();
        assert_eq!(instances[0].agent_id, Some("ana".into()));
        assert_eq!(instances[0].queue_id, Some("site".into()));

        let history = engine.audit().query(&AuditFilter::new()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].operation_type, OperationType::Distribution);
    }

    #[tokio::test]
    async fn repeated_event_neither_reassigns_nor_reattaches() {
        let calls = Arc::new(Calls::default());
        let engine = engine(calls.clone(), vec![welcome(OutcomeRules::default())]).await;
        engine.handle_event(&new_lead("l1", "Site")).await.unwrap();
        let report = engine.handle_event(&new_lead("l1", "Site")).await.unwrap();
        assert_eq!(report.distribution, Distribution::NotRequired);
        assert!(report.started.is_empty());
        assert_eq!(report.skipped, vec![CadenceId::from("boas-vindas")]);

        assert_eq!(calls.named("assign"), vec!["assign:l1:ana".to_string()]);
        let history = engine.audit().query(&AuditFilter::new()).await.unwrap();
        assert_eq!(history.len(), 1);
        let queue = engine.stores().queues.get_queue(&"site".into()).await.unwrap().unwrap();
        let counts: Vec<u64> = queue.members.iter().map(|m| m.assigned_count).collect();
        assert_eq!(counts, vec![1, 0]);
    }

    fn away(queue: Queue, who: &[&str]) -> Queue {
        let mut queue = queue;
        for member in &mut queue.members {
            if who.contains(&member.user_id.as_str()) {
                member.active = false;
            }
        }
        queue
    }

    #[tokio::test]
    async fn unassigned_lead_is_distributed_on_a_later_event() {
        let calls = Arc::new(Calls::default());
        let engine = Engine::new(Stores::new(Arc::new(MemoryStorage::new())), calls.clone());
        engine
            .import_definitions(vec![away(site_queue(), &["ana", "bruno"])], vec![])
            .await
            .unwrap();

        let first = engine.handle_event(&new_lead("l1", "Site")).await.unwrap();
        assert_eq!(
            first.distribution,
            Distribution::NoEligibleAgent {
                queue_id: "site".into()
            }
        );
        let state = engine.lead(&"l1".into()).await.unwrap().unwrap();
        assert!(!state.is_assigned());

        engine.import_definitions(vec![site_queue()], vec![]).await.unwrap();
        let moved = LeadEvent::new(
            "l1",
            LeadEventKind::StageChanged {
                stage: "Visita".into(),
            },
            LeadRecord::new().with("origem", "Site"),
        )
        .at(t0() + Duration::hours(1));
        let report = engine.handle_event(&moved).await.unwrap();
        assert_eq!(report.distribution.agent_id(), Some(&AgentId::from("ana")));
        assert_eq!(calls.named("assign"), vec!["assign:l1:ana".to_string()]);

        let state = engine.lead(&"l1".into()).await.unwrap().unwrap();
        assert_eq!(state.agent_id, Some("ana".into()));
        assert!(state.pending.is_none());
        let history = engine.audit().query(&AuditFilter::new()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].operation_type, OperationType::Distribution);
    }

    #[tokio::test]
    async fn unassigned_lead_is_distributed_by_the_tick() {
        let calls = Arc::new(Calls::default());
        let engine = Engine::new(Stores::new(Arc::new(MemoryStorage::new())), calls.clone());
        engine
            .import_definitions(
                vec![away(site_queue(), &["ana", "bruno"])],
                vec![welcome(OutcomeRules::default())],
            )
            .await
            .unwrap();
        let report = engine.handle_event(&new_lead("l1", "Site")).await.unwrap();
        assert_eq!(report.started.len(), 1);

        engine.import_definitions(vec![site_queue()], vec![]).await.unwrap();
        let tick = engine.tick(t0() + Duration::minutes(5)).await.unwrap();
        assert_eq!(tick.reassigned, 1);
        assert!(tick.is_clean());

        // The cadence opened while nobody was eligible now has a broker.
        let instance = engine.instances_for_lead(&"l1".into()).await.unwrap().remove(0);
        assert_eq!(instance.agent_id, Some("ana".into()));
        assert_eq!(instance.queue_id, Some("site".into()));

        let again = engine.tick(t0() + Duration::minutes(10)).await.unwrap();
        assert_eq!(again.reassigned, 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn unmatched_lead_stays_unassigned() {
        let calls = Arc::new(Calls::default());
        let engine = engine(calls.clone(), vec![]).await;
        let report = engine.handle_event(&new_lead("l1", "Facebook")).await.unwrap();
        assert_eq!(report.distribution, Distribution::Unrouted);
        assert!(calls.named("assign").is_empty());
        assert!(logs_contain("no queue matched"));
    }

    #[tokio::test]
    async fn collaborator_failures_are_reported_not_raised() {
        let calls = Arc::new(Calls {
            fail_steps: true,
            ..Calls::default()
        });
        let engine = engine(calls, vec![welcome(OutcomeRules::default())]).await;
        let report = engine.handle_event(&new_lead("l1", "Site")).await.unwrap();
        assert_eq!(report.started.len(), 1);
        assert_eq!(report.dispatch.errors.len(), 1);
        assert!(report.dispatch.errors[0].contains("outreach down"));
    }

    #[tokio::test]
    async fn tick_advances_due_instances_only() {
        let calls = Arc::new(Calls::default());
        let engine = engine(calls.clone(), vec![welcome(OutcomeRules::default())]).await;
        engine.handle_event(&new_lead("l1", "Site")).await.unwrap();

        let early = engine.tick(t0() + Duration::minutes(30)).await.unwrap();
        assert_eq!(early.examined, 1);
        assert_eq!(early.advanced, 0);

        let due = engine.tick(t0() + Duration::hours(1)).await.unwrap();
        assert_eq!(due.advanced, 1);
        assert!(due.is_clean());
        assert_eq!(calls.named("step").last().map(String::as_str), Some("step:ligar"));
    }

    #[tokio::test]
    async fn tick_isolates_failing_instances() {
        let calls = Arc::new(Calls::default());
        let engine = engine(calls, vec![welcome(OutcomeRules::default())]).await;
        engine.handle_event(&new_lead("l1", "Site")).await.unwrap();
        engine.handle_event(&new_lead("l2", "Site")).await.unwrap();

        // Orphan one instance by pointing it at a cadence that does not exist.
        let mut orphan = engine.instances_for_lead(&"l1".into()).await.unwrap().remove(0);
        orphan.cadence_id = "removida".into();
        engine.stores().instances.put_instance(&orphan).await.unwrap();

        let report = engine.tick(t0() + Duration::hours(2)).await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.advanced, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].instance_id, orphan.id);
    }

    #[tokio::test]
    async fn move_to_cadence_opens_the_follow_up() {
        let calls = Arc::new(Calls::default());
        let outcomes = OutcomeRules {
            on_responded: OutcomeAction::MoveToCadence {
                cadence_id: "nutricao".into(),
            },
            ..OutcomeRules::default()
        };
        let engine = engine(calls.clone(), vec![welcome(outcomes), follow_up()]).await;
        let report = engine.handle_event(&new_lead("l1", "Site")).await.unwrap();

        let applied = engine
            .apply_outcome(&report.started[0], &OutcomeFlags::responded(), t0())
            .await
            .unwrap();
        let follow_up_id = applied.dispatch.follow_up.clone().unwrap();
        let instances = engine.instances_for_lead(&"l1".into()).await.unwrap();
        let started = instances.iter().find(|i| i.id == follow_up_id).unwrap();
        assert_eq!(started.cadence_id, CadenceId::from("nutricao"));
        assert_eq!(started.agent_id, Some("ana".into()));
        assert_eq!(calls.named("step").last().map(String::as_str), Some("step:email"));
    }

    #[tokio::test]
    async fn manager_task_escalation() {
        let calls = Arc::new(Calls::default());
        let cadence = welcome(OutcomeRules::default()).with_attempts(AttemptPolicy {
            minimum_required_attempts: 1,
            post_failure_action: PostFailureAction::CreateManagerTask,
            ..AttemptPolicy::default()
        });
        let engine = engine(calls.clone(), vec![cadence]).await;
        let report = engine.handle_event(&new_lead("l1", "Site")).await.unwrap();
        let id = report.started[0].clone();

        engine
            .record_attempt(&id, Channel::Whatsapp, AttemptResult::NoAnswer, t0())
            .await
            .unwrap();
        let escalated = engine.check_escalation(&id, t0()).await.unwrap();
        assert_eq!(
            escalated.value,
            EscalationDecision::Escalate(PostFailureAction::CreateManagerTask)
        );
        assert_eq!(calls.named("task"), vec!["task:l1".to_string()]);
        assert!(engine.check_escalation(&id, t0()).await.unwrap_err().is_benign());
    }

    fn redistributing(cadence: Cadence) -> Cadence {
        cadence.with_attempts(AttemptPolicy {
            minimum_required_attempts: 1,
            post_failure_action: PostFailureAction::Redistribute,
            ..AttemptPolicy::default()
        })
    }

    fn reminder() -> Cadence {
        Cadence::new("lembrete", "Lembrete", CadenceTrigger::NewLead)
            .with_entry_rule(site_rule())
            .with_step(Step::new("email", Channel::Email, DurationSpec::days(1)))
    }

    async fn escalate_now(engine: &Engine, lead_id: &str) -> CommandReport<EscalationDecision> {
        let instances = engine.instances_for_lead(&lead_id.into()).await.unwrap();
        let id = instances
            .iter()
            .find(|i| i.cadence_id == CadenceId::from("boas-vindas"))
            .map(|i| i.id.clone())
            .unwrap();
        engine
            .record_attempt(&id, Channel::Whatsapp, AttemptResult::NoAnswer, t0())
            .await
            .unwrap();
        engine.check_escalation(&id, t0()).await.unwrap()
    }

    #[tokio::test]
    async fn escalation_moves_every_open_instance() {
        let calls = Arc::new(Calls::default());
        let cadences = vec![redistributing(welcome(OutcomeRules::default())), reminder()];
        let engine = engine(calls.clone(), cadences).await;
        let report = engine.handle_event(&new_lead("l1", "Site")).await.unwrap();
        assert_eq!(report.started.len(), 2);

        let escalated = escalate_now(&engine, "l1").await;
        assert_eq!(
            escalated.value,
            EscalationDecision::Escalate(PostFailureAction::Redistribute)
        );
        assert_eq!(escalated.instance.agent_id, Some("bruno".into()));
        assert_eq!(escalated.dispatch.assigned_to, Some("bruno".into()));

        let instances = engine.instances_for_lead(&"l1".into()).await.unwrap();
        assert_eq!(instances.len(), 2);
        assert!(instances.iter().all(|i| i.agent_id == Some("bruno".into())));

        let report = engine
            .redistribute(
                RedistributionRequest::new("l1", "troca de plantão"),
                t0() + Duration::minutes(30),
            )
            .await
            .unwrap();
        assert_eq!(report.previous_agent_id, Some("bruno".into()));
        assert_eq!(report.agent_id, AgentId::from("ana"));
        assert_eq!(
            calls.named("assign"),
            vec![
                "assign:l1:ana".to_string(),
                "assign:l1:bruno".to_string(),
                "assign:l1:ana".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failed_escalation_is_retried_once_someone_is_eligible() {
        let calls = Arc::new(Calls::default());
        let engine = engine(calls.clone(), vec![redistributing(welcome(OutcomeRules::default()))]).await;
        engine.handle_event(&new_lead("l1", "Site")).await.unwrap();

        engine
            .import_definitions(vec![away(site_queue(), &["ana", "bruno"])], vec![])
            .await
            .unwrap();
        let escalated = escalate_now(&engine, "l1").await;
        assert_eq!(escalated.dispatch.errors.len(), 1);
        assert!(escalated.dispatch.errors[0].starts_with("escalate"));
        assert_eq!(escalated.instance.agent_id, Some("ana".into()));

        let state = engine.lead(&"l1".into()).await.unwrap().unwrap();
        let pending = state.pending.clone().unwrap();
        assert_eq!(pending.operation, OperationType::Escalation);
        assert_eq!(pending.queue_id, QueueId::from("site"));
        assert_eq!(state.agent_id, Some("ana".into()));
        // The escalation latch has fired; only the pending retry remains.
        let id = escalated.instance.id.clone();
        assert!(engine.check_escalation(&id, t0()).await.unwrap_err().is_benign());

        engine
            .import_definitions(vec![away(site_queue(), &["ana"])], vec![])
            .await
            .unwrap();
        let tick = engine.tick(t0() + Duration::minutes(1)).await.unwrap();
        assert_eq!(tick.reassigned, 1);

        let state = engine.lead(&"l1".into()).await.unwrap().unwrap();
        assert_eq!(state.agent_id, Some("bruno".into()));
        assert!(state.pending.is_none());
        let instance = engine.instances_for_lead(&"l1".into()).await.unwrap().remove(0);
        assert_eq!(instance.agent_id, Some("bruno".into()));

        let history = engine.audit().query(&AuditFilter::new()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].operation_type, OperationType::Escalation);
        assert_eq!(history[0].previous_broker, Some("ana".into()));
        assert_eq!(calls.named("assign").last().map(String::as_str), Some("assign:l1:bruno"));
    }

    #[tokio::test]
    async fn manual_redistribution_updates_open_instances() {
        let calls = Arc::new(Calls::default());
        let engine = engine(calls.clone(), vec![welcome(OutcomeRules::default())]).await;
        engine.handle_event(&new_lead("l1", "Site")).await.unwrap();

        let report = engine
            .redistribute(
                RedistributionRequest::new("l1", "corretor de férias").by_user("gestor"),
                t0() + Duration::minutes(30),
            )
            .await
            .unwrap();
        assert_eq!(report.previous_agent_id, Some("ana".into()));
        assert_eq!(report.agent_id, AgentId::from("bruno"));
        assert_eq!(report.updated_instances.len(), 1);

        let instance = engine.instances_for_lead(&"l1".into()).await.unwrap().remove(0);
        assert_eq!(instance.agent_id, Some("bruno".into()));

        let history = engine.audit().query(&AuditFilter::new()).await.unwrap();
        assert_eq!(history.len(), 2);
        let latest = &history[0];
        assert_eq!(latest.operation_type, OperationType::Redistribution);
        assert_eq!(latest.previous_broker, Some("ana".into()));
        assert_eq!(latest.responsible, Responsible::User("gestor".into()));
        assert!(latest.time_bucket.is_some());
    }

    #[tokio::test]
    async fn import_rejects_invalid_definitions_without_storing() {
        let calls = Arc::new(Calls::default());
        let engine = Engine::new(Stores::new(Arc::new(MemoryStorage::new())), calls);
        let nameless = Queue::new("q", "").with_rule(site_rule());
        let err = engine
            .import_definitions(vec![site_queue(), nameless], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(_)));
        assert!(engine.stores().queues.list_queues().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn later_imports_may_reference_stored_queues() {
        let calls = Arc::new(Calls::default());
        let engine = engine(calls, vec![]).await;
        let mut backup = Queue::new("backup", "Backup")
            .with_rule(site_rule())
            .with_member(QueueMember::new("diego"));
        backup.advanced.overflow_queue_id = Some("site".into());
        engine.import_definitions(vec![backup], vec![]).await.unwrap();

        let mut dangling = Queue::new("orfa", "Órfã").with_rule(site_rule());
        dangling.advanced.overflow_queue_id = Some("nenhuma".into());
        let err = engine
            .import_definitions(vec![dangling], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(_)));
        assert_eq!(engine.stores().queues.list_queues().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn import_fills_missing_step_deadlines() {
        let calls = Arc::new(Calls::default());
        let engine = Engine::new(Stores::new(Arc::new(MemoryStorage::new())), calls);
        let cadence = Cadence::new("c", "Sem prazo", CadenceTrigger::NewLead)
            .with_entry_rule(site_rule())
            .with_step(Step::new("s", Channel::Call, DurationSpec::default()));
        engine.import_definitions(vec![], vec![cadence]).await.unwrap();
        let stored = engine
            .stores()
            .cadences
            .get_cadence(&"c".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.steps[0].deadline, engine.settings().default_step_deadline);
    }
}
