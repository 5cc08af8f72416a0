// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Round-robin member selection.
//!
//! Eligible members are the active ones that pass the queue's check-in
//! policy at call time and have spare capacity, ordered by priority (ties by
//! insertion order). The next pick is the eligible member after the rotation
//! cursor, wrapping; a cursor that is null or not currently eligible restarts
//! from the front.

use chrono::{DateTime, Utc};
use leadflow_core::model::{Queue, QueueMember};
use leadflow_core::{AgentId, LeadflowError};

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueAssignor;

impl QueueAssignor {
    fn is_member_eligible(queue: &Queue, member: &QueueMember, now: DateTime<Utc>) -> bool {
        member.active
            && queue.check_in.admits(member, now)
            && queue
                .advanced
                .max_concurrent_leads
                .is_none_or(|limit| member.open_leads < limit)
    }

    /// Eligible members in rotation order.
    pub fn eligible_members(queue: &Queue, now: DateTime<Utc>) -> Vec<&QueueMember> {
        queue
            .rotation_order()
            .into_iter()
            .filter(|m| Self::is_member_eligible(queue, m, now))
            .collect()
    }

    pub fn is_eligible(queue: &Queue, agent: &AgentId, now: DateTime<Utc>) -> bool {
        queue
            .member(agent)
            .is_some_and(|m| Self::is_member_eligible(queue, m, now))
    }

    /// Pick the next member without changing the queue.
    pub fn select(queue: &Queue, now: DateTime<Utc>) -> Result<AgentId, LeadflowError> {
        let eligible = Self::eligible_members(queue, now);
        if eligible.is_empty() {
            return Err(LeadflowError::NoEligibleAgent {
                queue_id: queue.id.to_string(),
            });
        }
        let next = queue
            .next_member_id
            .as_ref()
            .and_then(|cursor| eligible.iter().position(|m| &m.user_id == cursor))
            .map_or(0, |position| (position + 1) % eligible.len());
        Ok(eligible[next].user_id.clone())
    }

    /// Move the cursor to `agent` and count the assignment.
    pub fn apply(queue: &mut Queue, agent: &AgentId) {
        if let Some(member) = queue.member_mut(agent) {
            member.assigned_count += 1;
            member.open_leads = member.open_leads.saturating_add(1);
        }
        queue.next_member_id = Some(agent.clone());
    }

    /// Select and apply. On error the queue is untouched.
    pub fn assign(queue: &mut Queue, now: DateTime<Utc>) -> Result<AgentId, LeadflowError> {
        let agent = Self::select(queue, now)?;
        Self::apply(queue, &agent);
        Ok(agent)
    }

    /// A lead held by `agent` was closed or moved away.
    pub fn release(queue: &mut Queue, agent: &AgentId) {
        if let Some(member) = queue.member_mut(agent) {
            member.open_leads = member.open_leads.saturating_sub(1);
        }
    }
}
