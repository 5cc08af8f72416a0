// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for round-robin fairness.

use chrono::Utc;
use leadflow_core::model::{Queue, QueueMember};
use leadflow_router::QueueAssignor;
use proptest::prelude::*;

/// Members as (active, priority) pairs.
fn members() -> impl Strategy<Value = Vec<(bool, u32)>> {
    prop::collection::vec((any::<bool>(), 0u32..4), 1..8)
}

fn build(layout: &[(bool, u32)]) -> Queue {
    layout.iter()
        .enumerate()
        .fold(Queue::new("q", "Props"), |queue, (i, (active, priority))| {
            let mut member = QueueMember::new(format!("m{i}")).with_priority(*priority);
            member.active = *active;
            queue.with_member(member)
        })
}

proptest! {
    #[test]
    fn every_active_member_served_once_per_round(layout in members(), rounds in 1usize..5) {
        let mut queue = build(&layout);
        let active = queue.active_member_count();
        prop_assume!(active > 0);
        let now = Utc::now();

        for _ in 0..rounds {
            let mut served: Vec<String> = (0..active)
                .map(|_| QueueAssignor::assign(&mut queue, now).unwrap().to_string())
                .collect();
            served.sort();
            served.dedup();
            prop_assert_eq!(served.len(), active);
        }
        for member in &queue.members {
            let expected = if member.active { rounds as u64 } else { 0 };
            prop_assert_eq!(member.assigned_count, expected);
        }
    }

    #[test]
    fn strict_rotation_follows_priority_order(layout in members()) {
        let mut queue = build(&layout);
        let order: Vec<String> = queue
            .rotation_order()
            .into_iter()
            .filter(|m| m.active)
            .map(|m| m.user_id.to_string())
            .collect();
        prop_assume!(!order.is_empty());
        let now = Utc::now();

        let picks: Vec<String> = (0..order.len() * 2)
            .map(|_| QueueAssignor::assign(&mut queue, now).unwrap().to_string())
            .collect();
        let expected: Vec<String> = order.iter().chain(order.iter()).cloned().collect();
        prop_assert_eq!(picks, expected);
    }

    #[test]
    fn no_active_members_means_no_assignment(len in 1usize..6) {
        let layout: Vec<(bool, u32)> = (0..len).map(|_| (false, 0)).collect();
        let mut queue = build(&layout);
        prop_assert!(QueueAssignor::assign(&mut queue, Utc::now()).is_err());
        prop_assert_eq!(queue.next_member_id, None);
    }
}
