// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborators that capture every call for assertions.

use std::collections::HashSet;

use async_trait::async_trait;
use leadflow_core::traits::Collaborators;
use leadflow_core::{
    Assignment, LeadId, LeadflowError, ManagerTask, QueueId, RetryReminder, StepDispatch,
};
use tokio::sync::Mutex;

/// One captured collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Step(StepDispatch),
    Reminder(RetryReminder),
    ManagerTask(ManagerTask),
    Discard { lead_id: LeadId, reason: String },
    Move {
        lead_id: LeadId,
        queue_id: Option<QueueId>,
    },
    PostSale { lead_id: LeadId, offset_days: u32 },
    Assignment(Assignment),
}

impl Call {
    /// Name of the collaborator method that produced this call.
    pub fn name(&self) -> &'static str {
        match self {
            Call::Step(_) => "dispatch_step",
            Call::Reminder(_) => "remind_retry",
            Call::ManagerTask(_) => "create_manager_task",
            Call::Discard { .. } => "discard_lead",
            Call::Move { .. } => "move_to_queue",
            Call::PostSale { .. } => "start_post_sale",
            Call::Assignment(_) => "notify_assignment",
        }
    }
}

/// A [`Collaborators`] implementation that records calls instead of
/// performing them.
///
/// Calls whose method name was registered with [`fail`](Self::fail) return
/// a collaborator error and are not recorded.
#[derive(Default)]
pub struct RecordingCollaborators {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `method` fail from now on.
    pub async fn fail(&self, method: &'static str) {
        self.failing.lock().await.insert(method);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.name() == method)
            .count()
    }

    pub async fn assignments(&self) -> Vec<Assignment> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                Call::Assignment(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn steps(&self) -> Vec<StepDispatch> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                Call::Step(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn clear(&self) {
        self.calls.lock().await.clear();
    }

    async fn record(&self, call: Call) -> Result<(), LeadflowError> {
        if self.failing.lock().await.contains(call.name()) {
            return Err(LeadflowError::Collaborator {
                message: format!("{} failed (injected)", call.name()),
                source: None,
            });
        }
        self.calls.lock().await.push(call);
        Ok(())
    }
}

#[async_trait]
impl Collaborators for RecordingCollaborators {
    async fn dispatch_step(&self, dispatch: &StepDispatch) -> Result<(), LeadflowError> {
        self.record(Call::Step(dispatch.clone())).await
    }

    async fn remind_retry(&self, reminder: &RetryReminder) -> Result<(), LeadflowError> {
        self.record(Call::Reminder(reminder.clone())).await
    }

    async fn create_manager_task(&self, task: &ManagerTask) -> Result<(), LeadflowError> {
        self.record(Call::ManagerTask(task.clone())).await
    }

    async fn discard_lead(&self, lead_id: &LeadId, reason: &str) -> Result<(), LeadflowError> {
        self.record(Call::Discard {
            lead_id: lead_id.clone(),
            reason: reason.to_string(),
        })
        .await
    }

    async fn move_to_queue(
        &self,
        lead_id: &LeadId,
        queue_id: Option<&QueueId>,
    ) -> Result<(), LeadflowError> {
        self.record(Call::Move {
            lead_id: lead_id.clone(),
            queue_id: queue_id.cloned(),
        })
        .await
    }

    async fn start_post_sale(&self, lead_id: &LeadId, offset_days: u32) -> Result<(), LeadflowError> {
        self.record(Call::PostSale {
            lead_id: lead_id.clone(),
            offset_days,
        })
        .await
    }

    async fn notify_assignment(&self, assignment: &Assignment) -> Result<(), LeadflowError> {
        self.record(Call::Assignment(assignment.clone())).await
    }
}
