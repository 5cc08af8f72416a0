// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcome routing: which outcome rule applies to a set of recorded flags.

use chrono::{DateTime, Utc};
use leadflow_core::model::{OutcomeAction, OutcomeRules};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Outcomes reported for a lead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutcomeFlags {
    #[serde(alias = "respondeu")]
    pub responded: bool,
    #[serde(alias = "visitaAgendada")]
    pub visit_scheduled: bool,
    #[serde(alias = "negocioFechado")]
    pub deal_closed: bool,
    /// When the scheduled visit happens. Resumes visit-date pauses.
    pub visit_at: Option<DateTime<Utc>>,
}

impl OutcomeFlags {
    pub fn responded() -> Self {
        Self {
            responded: true,
            ..Self::default()
        }
    }

    pub fn visit_scheduled(at: Option<DateTime<Utc>>) -> Self {
        Self {
            visit_scheduled: true,
            visit_at: at,
            ..Self::default()
        }
    }

    pub fn deal_closed() -> Self {
        Self {
            deal_closed: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.responded || self.visit_scheduled || self.deal_closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OutcomeKind {
    DealClosed,
    VisitScheduled,
    Responded,
}

/// The outcome that won and the action its rule prescribes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedOutcome {
    pub kind: OutcomeKind,
    pub action: OutcomeAction,
}

impl RoutedOutcome {
    /// `continue` leaves the instance where it is.
    pub fn changes_state(&self) -> bool {
        self.action != OutcomeAction::Continue
    }
}

pub struct OutcomeRouter;

impl OutcomeRouter {
    /// Highest-priority outcome present: deal closed, then visit scheduled,
    /// then responded.
    pub fn route(flags: &OutcomeFlags, rules: &OutcomeRules) -> Option<RoutedOutcome> {
        let (kind, action) = if flags.deal_closed {
            (OutcomeKind::DealClosed, &rules.on_deal_closed)
        } else if flags.visit_scheduled {
            (OutcomeKind::VisitScheduled, &rules.on_visit_scheduled)
        } else if flags.responded {
            (OutcomeKind::Responded, &rules.on_responded)
        } else {
            return None;
        };
        Some(RoutedOutcome {
            kind,
            action: action.clone(),
        })
    }
}
