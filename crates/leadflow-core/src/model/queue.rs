// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Distribution queues (filas), their members, and the rotation cursor.
//!
//! The rotation cursor (`next_member_id`) must always reference a member that
//! is currently marked active. Every mutation that can break that invariant
//! goes through a method here that re-resolves the cursor.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::LeadflowError;
use crate::model::rule::Rule;
use crate::types::{AgentId, QueueId};

/// Brasília time, the market the CRM serves.
const DEFAULT_UTC_OFFSET_MINUTES: i32 = -180;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueType {
    #[default]
    #[serde(alias = "personalizada")]
    Custom,
    #[serde(alias = "padrao", alias = "padrão")]
    Standard,
}

/// A weekly time window during which a member may receive leads.
///
/// `start > end` denotes an overnight window (22:00 to 06:00); the weekday
/// refers to the day the window opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityWindow {
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl AvailabilityWindow {
    pub fn new(days: Vec<Weekday>, start: NaiveTime, end: NaiveTime) -> Self {
        Self { days, start, end }
    }

    /// Whether the local wall-clock moment falls inside the window.
    pub fn contains(&self, weekday: Weekday, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.days.contains(&weekday) && time >= self.start && time < self.end
        } else {
            (self.days.contains(&weekday) && time >= self.start)
                || (self.days.contains(&weekday.pred()) && time < self.end)
        }
    }
}

/// Check-in (availability) policy of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInPolicy {
    /// When false, every active member is eligible at any time.
    #[serde(default)]
    pub required: bool,
    /// Queue-wide windows, used for members without their own windows.
    #[serde(default)]
    pub windows: Vec<AvailabilityWindow>,
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

impl Default for CheckInPolicy {
    fn default() -> Self {
        Self {
            required: false,
            windows: Vec::new(),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }
}

fn default_utc_offset() -> i32 {
    DEFAULT_UTC_OFFSET_MINUTES
}

impl CheckInPolicy {
    /// Whether `member` is inside its availability window at `now`.
    pub fn admits(&self, member: &QueueMember, now: DateTime<Utc>) -> bool {
        if !self.required {
            return true;
        }
        let windows = if member.availability.is_empty() {
            &self.windows
        } else {
            &member.availability
        };
        // Out-of-range offsets fall back to UTC.
        let offset = FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());
        let local = now.with_timezone(&offset);
        let (weekday, time) = (local.weekday(), local.time());
        windows.iter().any(|w| w.contains(weekday, time))
    }
}

/// An agent configured in a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMember {
    #[serde(alias = "usuarioId")]
    pub user_id: AgentId,
    #[serde(default = "default_true", alias = "ativo")]
    pub active: bool,
    /// Lower values are served first; ties keep insertion order.
    #[serde(default, alias = "prioridade")]
    pub priority: u32,
    /// Per-member windows overriding the queue's check-in windows.
    #[serde(default)]
    pub availability: Vec<AvailabilityWindow>,
    /// Leads this member received through rotation.
    #[serde(default)]
    pub assigned_count: u64,
    /// Leads currently open with this member (capacity gate).
    #[serde(default)]
    pub open_leads: u32,
}

fn default_true() -> bool {
    true
}

impl QueueMember {
    pub fn new(user_id: impl Into<AgentId>) -> Self {
        Self {
            user_id: user_id.into(),
            active: true,
            priority: 0,
            availability: Vec::new(),
            assigned_count: 0,
            open_leads: 0,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_availability(mut self, windows: Vec<AvailabilityWindow>) -> Self {
        self.availability = windows;
        self
    }
}

/// Advanced queue settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedConfig {
    /// Queue tried once when this queue has no eligible agent.
    #[serde(default)]
    pub overflow_queue_id: Option<QueueId>,
    /// Members holding this many open leads are skipped.
    #[serde(default)]
    pub max_concurrent_leads: Option<u32>,
    /// Target of the "move to primary queue" outcome action.
    #[serde(default)]
    pub primary: bool,
}

/// A routing bucket that leads are matched into and assigned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    pub id: QueueId,
    #[serde(alias = "nome")]
    pub name: String,
    #[serde(default, rename = "type", alias = "tipo")]
    pub queue_type: QueueType,
    /// Evaluation order among queues; lower first.
    #[serde(default)]
    pub position: u32,
    #[serde(default, alias = "regras")]
    pub rules: Vec<Rule>,
    #[serde(default, alias = "membros")]
    pub members: Vec<QueueMember>,
    /// Rotation cursor: the member that received the previous lead.
    #[serde(default)]
    pub next_member_id: Option<AgentId>,
    #[serde(default)]
    pub check_in: CheckInPolicy,
    #[serde(default)]
    pub advanced: AdvancedConfig,
    /// Optimistic-lock counter maintained by the stores.
    #[serde(default)]
    pub version: u64,
}

impl Queue {
    pub fn new(id: impl Into<QueueId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            queue_type: QueueType::default(),
            position: 0,
            rules: Vec::new(),
            members: Vec::new(),
            next_member_id: None,
            check_in: CheckInPolicy::default(),
            advanced: AdvancedConfig::default(),
            version: 0,
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_member(mut self, member: QueueMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn active_member_count(&self) -> usize {
        self.members.iter().filter(|m| m.active).count()
    }

    pub fn member(&self, user_id: &AgentId) -> Option<&QueueMember> {
        self.members.iter().find(|m| &m.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: &AgentId) -> Option<&mut QueueMember> {
        self.members.iter_mut().find(|m| &m.user_id == user_id)
    }

    /// All members in rotation order: priority ascending, ties by insertion.
    pub fn rotation_order(&self) -> Vec<&QueueMember> {
        let mut ordered: Vec<&QueueMember> = self.members.iter().collect();
        ordered.sort_by_key(|m| m.priority);
        ordered
    }

    pub fn add_member(&mut self, member: QueueMember) -> Result<(), LeadflowError> {
        if self.member(&member.user_id).is_some() {
            return Err(LeadflowError::validation(format!(
                "member {} already belongs to queue {}",
                member.user_id, self.id
            )));
        }
        self.members.push(member);
        Ok(())
    }

    /// Activate or deactivate a member, keeping the cursor valid.
    pub fn set_member_active(
        &mut self,
        user_id: &AgentId,
        active: bool,
    ) -> Result<(), LeadflowError> {
        let successor = self.active_successor(user_id);
        let member = self.member_mut(user_id).ok_or_else(|| LeadflowError::NotFound {
            entity: "queue member",
            id: user_id.to_string(),
        })?;
        member.active = active;
        if !active && self.next_member_id.as_ref() == Some(user_id) {
            self.next_member_id = successor;
        }
        Ok(())
    }

    /// Remove a member, keeping the cursor valid.
    pub fn remove_member(&mut self, user_id: &AgentId) -> Result<QueueMember, LeadflowError> {
        let successor = self.active_successor(user_id);
        let index = self
            .members
            .iter()
            .position(|m| &m.user_id == user_id)
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "queue member",
                id: user_id.to_string(),
            })?;
        let removed = self.members.remove(index);
        if self.next_member_id.as_ref() == Some(user_id) {
            self.next_member_id = successor;
        }
        Ok(removed)
    }

    /// The next active member after `user_id` in rotation order (wrapping),
    /// excluding `user_id` itself.
    pub fn active_successor(&self, user_id: &AgentId) -> Option<AgentId> {
        let ordered = self.rotation_order();
        let start = ordered.iter().position(|m| &m.user_id == user_id)?;
        let len = ordered.len();
        (1..len)
            .map(|offset| ordered[(start + offset) % len])
            .find(|m| m.active)
            .map(|m| m.user_id.clone())
    }

    /// Drop a cursor that no longer references an active member.
    ///
    /// Returns true when the cursor changed.
    pub fn repair_cursor(&mut self) -> bool {
        let valid = match &self.next_member_id {
            None => true,
            Some(id) => self.member(id).is_some_and(|m| m.active),
        };
        if !valid {
            self.next_member_id = None;
        }
        !valid
    }

    /// Carry the server-side rotation state over a full-document replace.
    ///
    /// Clients submit edited queue documents built from a possibly stale
    /// copy; the stored cursor and assignment counters are authoritative.
    pub fn reconcile_rotation_from(&mut self, stored: &Queue) {
        self.next_member_id = stored.next_member_id.clone();
        for member in &mut self.members {
            if let Some(previous) = stored.member(&member.user_id) {
                member.assigned_count = previous.assigned_count;
                member.open_leads = previous.open_leads;
            }
        }
        if let Some(cursor) = self.next_member_id.clone() {
            match self.member(&cursor) {
                Some(m) if m.active => {}
                Some(_) => self.next_member_id = self.active_successor(&cursor),
                None => {
                    // The cursor's member was dropped from the document; fall
                    // back to its successor in the stored rotation.
                    self.next_member_id = stored
                        .active_successor(&cursor)
                        .filter(|id| self.member(id).is_some_and(|m| m.active));
                }
            }
        }
    }
}
