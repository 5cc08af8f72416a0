// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadence definitions: trigger, entry rules, ordered steps, attempt policy
//! (tentativas) and outcome rules.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::duration::DurationSpec;
use crate::error::LeadflowError;
use crate::model::rule::Rule;
use crate::types::{AgentId, CadenceId, Channel, StepId};

/// What starts a cadence for a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CadenceTrigger {
    NewLead,
    /// Lead entered one of `stages`; empty means any stage.
    StageChanged {
        #[serde(default)]
        stages: Vec<String>,
    },
    NoResponse { hours: u32 },
    Inactivity { days: u32 },
    #[serde(rename_all = "camelCase")]
    PostSale { day_offsets: Vec<u32> },
    Manual,
}

/// Who performs a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepOwner {
    /// The broker the lead is assigned to.
    #[default]
    AssignedAgent,
    Role(String),
    User(AgentId),
}

/// One outreach action in a cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,
    #[serde(alias = "nome")]
    pub name: String,
    #[serde(alias = "canal")]
    pub channel: Channel,
    /// Relative to the moment the step becomes active.
    #[serde(alias = "prazo")]
    pub deadline: DurationSpec,
    #[serde(default, alias = "responsavel")]
    pub owner: StepOwner,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default = "default_true", alias = "ativo")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Step {
    pub fn new(id: impl Into<StepId>, channel: Channel, deadline: DurationSpec) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            channel,
            deadline,
            owner: StepOwner::default(),
            template: None,
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// What counts as a successful attempt sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpectedOutcome {
    /// At least one attempt reached the lead.
    #[default]
    #[serde(alias = "contatoEstabelecido", alias = "Contato estabelecido")]
    ContactEstablished,
    /// Touch-only sequence: reaching the minimum count is enough.
    #[serde(alias = "semResposta", alias = "Sem resposta")]
    NoResponse,
}

/// What happens when the attempt threshold is crossed without the expected
/// outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostFailureAction {
    #[serde(alias = "descartar")]
    Discard,
    #[serde(alias = "redistribuir")]
    Redistribute,
    #[default]
    #[serde(alias = "criarTarefaGestor", alias = "criar-tarefa-gestor")]
    CreateManagerTask,
}

impl PostFailureAction {
    /// Derived `redistribuir` flag.
    pub fn redistributes(self) -> bool {
        matches!(self, PostFailureAction::Redistribute)
    }

    /// Derived `criarTarefaGestor` flag.
    pub fn creates_manager_task(self) -> bool {
        matches!(self, PostFailureAction::CreateManagerTask)
    }
}

/// Attempt policy (tentativas) of a cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptPolicy {
    #[serde(default, alias = "tentativasMinimas")]
    pub minimum_required_attempts: u32,
    #[serde(default, alias = "intervaloEntreTentativas")]
    pub interval_between_attempts: DurationSpec,
    /// Empty means every channel counts.
    #[serde(default, alias = "canaisPermitidos")]
    pub allowed_channels: Vec<Channel>,
    #[serde(default, alias = "resultadoEsperado")]
    pub expected_outcome: ExpectedOutcome,
    #[serde(default, alias = "acaoPosFalha")]
    pub post_failure_action: PostFailureAction,
    #[serde(default, alias = "motivoFalha")]
    pub failure_reason: Option<String>,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            minimum_required_attempts: 0,
            interval_between_attempts: DurationSpec::ZERO,
            allowed_channels: Vec::new(),
            expected_outcome: ExpectedOutcome::default(),
            post_failure_action: PostFailureAction::default(),
            failure_reason: None,
        }
    }
}

impl AttemptPolicy {
    pub fn counts_channel(&self, channel: Channel) -> bool {
        self.allowed_channels.is_empty() || self.allowed_channels.contains(&channel)
    }

    pub fn is_required(&self) -> bool {
        self.minimum_required_attempts > 0
    }
}

/// Action taken when a qualifying outcome is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum OutcomeAction {
    End,
    PauseUntilVisit,
    PauseUntilVisitDate,
    #[serde(rename_all = "camelCase")]
    MoveToCadence { cadence_id: CadenceId },
    Continue,
    #[serde(rename_all = "camelCase")]
    MoveToPostSale {
        #[serde(default)]
        offset_days: u32,
    },
    MoveToPrimaryQueue,
}

/// Outcome-to-action mapping of a cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRules {
    #[serde(default = "default_on_responded", alias = "aoResponder")]
    pub on_responded: OutcomeAction,
    #[serde(default = "default_on_visit", alias = "aoAgendarVisita")]
    pub on_visit_scheduled: OutcomeAction,
    #[serde(default = "default_on_deal", alias = "aoFecharNegocio")]
    pub on_deal_closed: OutcomeAction,
}

fn default_on_responded() -> OutcomeAction {
    OutcomeAction::End
}

fn default_on_visit() -> OutcomeAction {
    OutcomeAction::PauseUntilVisitDate
}

fn default_on_deal() -> OutcomeAction {
    OutcomeAction::End
}

impl Default for OutcomeRules {
    fn default() -> Self {
        Self {
            on_responded: default_on_responded(),
            on_visit_scheduled: default_on_visit(),
            on_deal_closed: default_on_deal(),
        }
    }
}

/// A cadence definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cadence {
    pub id: CadenceId,
    #[serde(alias = "nome")]
    pub name: String,
    #[serde(default, alias = "descricao")]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(alias = "gatilho")]
    pub trigger: CadenceTrigger,
    #[serde(default, alias = "regrasEntrada")]
    pub entry_rules: Vec<Rule>,
    #[serde(default, alias = "etapas")]
    pub steps: Vec<Step>,
    #[serde(default, alias = "tentativas")]
    pub attempts: AttemptPolicy,
    #[serde(default, alias = "resultados")]
    pub outcomes: OutcomeRules,
    /// Advisory service-level text; never enforced.
    #[serde(default)]
    pub sla: Option<String>,
    #[serde(default = "default_true", alias = "ativa")]
    pub active: bool,
    #[serde(default)]
    pub version: u64,
}

impl Cadence {
    pub fn new(id: impl Into<CadenceId>, name: impl Into<String>, trigger: CadenceTrigger) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            trigger,
            entry_rules: Vec::new(),
            steps: Vec::new(),
            attempts: AttemptPolicy::default(),
            outcomes: OutcomeRules::default(),
            sla: None,
            active: true,
            version: 0,
        }
    }

    pub fn with_entry_rule(mut self, rule: Rule) -> Self {
        self.entry_rules.push(rule);
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_attempts(mut self, attempts: AttemptPolicy) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_outcomes(mut self, outcomes: OutcomeRules) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Index of the first active step at or after `from`.
    pub fn next_active_step(&self, from: usize) -> Option<usize> {
        self.steps
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, step)| step.active)
            .map(|(index, _)| index)
    }

    /// Replace the step order with `order`, which must be a permutation of the
    /// current step ids. On error the cadence is left untouched.
    pub fn reorder_steps(&mut self, order: &[StepId]) -> Result<(), LeadflowError> {
        let mut problems = Vec::new();
        if order.len() != self.steps.len() {
            problems.push(format!(
                "reorder lists {} steps but cadence {} has {}",
                order.len(),
                self.id,
                self.steps.len()
            ));
        }
        let mut seen = HashSet::new();
        for id in order {
            if !seen.insert(id) {
                problems.push(format!("step {id} appears more than once"));
            } else if !self.steps.iter().any(|s| &s.id == id) {
                problems.push(format!("step {id} does not belong to cadence {}", self.id));
            }
        }
        if !problems.is_empty() {
            return Err(LeadflowError::Validation(problems));
        }

        let mut remaining = std::mem::take(&mut self.steps);
        let mut reordered = Vec::with_capacity(remaining.len());
        for id in order {
            // Every id was verified above, so the lookup always succeeds.
            if let Some(position) = remaining.iter().position(|s| &s.id == id) {
                reordered.push(remaining.swap_remove(position));
            }
        }
        self.steps = reordered;
        Ok(())
    }
}
