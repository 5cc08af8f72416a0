// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete Leadflow pipeline.
//!
//! Each test creates an isolated TestHarness with its own storage and
//! recording collaborators. Tests are independent and order-insensitive.

use chrono::Duration;
use leadflow_cadence::{EscalationDecision, OutcomeFlags};
use leadflow_core::model::{
    AttemptResult, AuditFilter, OperationType, OutcomeAction, OutcomeRules, PostFailureAction,
};
use leadflow_core::{AgentId, Channel};
use leadflow_engine::Distribution;
use leadflow_test_utils::fixtures::{self, t0};
use leadflow_test_utils::{Call, TestHarness};

fn agent(report: &leadflow_engine::EventReport) -> Option<&str> {
    report.distribution.agent_id().map(AgentId::as_str)
}

// ---- Test 1: Round-robin distribution ----

async fn assert_round_robin(harness: &TestHarness) {
    let first = harness.new_lead("l1", "Site").await.unwrap();
    let second = harness.new_lead("l2", "Site").await.unwrap();
    let third = harness.new_lead("l3", "Site").await.unwrap();

    assert_eq!(agent(&first), Some("ana"));
    assert_eq!(agent(&second), Some("bruno"));
    // carla is inactive, so the rotation wraps back to ana.
    assert_eq!(agent(&third), Some("ana"));

    let facebook = harness.new_lead("l4", "Facebook").await.unwrap();
    assert_eq!(facebook.distribution, Distribution::Unrouted);

    let notified: Vec<_> = harness
        .collaborators
        .assignments()
        .await
        .into_iter()
        .map(|a| a.agent_id.to_string())
        .collect();
    assert_eq!(notified, ["ana", "bruno", "ana"]);

    let history = harness.history().await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(
        history
            .iter()
            .all(|item| item.operation_type == OperationType::Distribution)
    );
}

#[tokio::test]
async fn site_leads_rotate_over_active_brokers() {
    let harness = TestHarness::builder()
        .with_queue(fixtures::site_queue())
        .build()
        .await
        .unwrap();
    assert_round_robin(&harness).await;
}

#[tokio::test]
async fn rotation_survives_sqlite_round_trips() {
    let harness = TestHarness::builder()
        .with_queue(fixtures::site_queue())
        .with_sqlite()
        .build()
        .await
        .unwrap();
    assert_round_robin(&harness).await;
}

#[tokio::test]
async fn queues_are_matched_in_position_order() {
    let harness = TestHarness::builder()
        .with_queue(fixtures::backup_queue())
        .with_queue(fixtures::site_queue())
        .build()
        .await
        .unwrap();

    let portal = harness.new_lead("l1", "Portal").await.unwrap();
    assert_eq!(portal.distribution.queue_id().map(|q| q.as_str()), Some(fixtures::BACKUP_QUEUE));
    assert_eq!(agent(&portal), Some("diego"));

    let site = harness.new_lead("l2", "Site").await.unwrap();
    assert_eq!(site.distribution.queue_id().map(|q| q.as_str()), Some(fixtures::SITE_QUEUE));
}

// ---- Test 2: Mandatory retries and escalation ----

#[tokio::test]
async fn failed_attempts_redistribute_exactly_once() {
    let harness = TestHarness::builder()
        .with_queue(fixtures::site_queue())
        .with_cadence(fixtures::welcome_cadence(2, PostFailureAction::Redistribute))
        .build()
        .await
        .unwrap();

    let report = harness.new_lead("l1", "Site").await.unwrap();
    assert_eq!(agent(&report), Some("ana"));
    assert_eq!(report.started.len(), 1);
    let instance_id = report.started[0].clone();

    for minutes in [5, 10] {
        let verdict = harness
            .engine
            .record_attempt(
                &instance_id,
                Channel::Whatsapp,
                AttemptResult::NoAnswer,
                t0() + Duration::minutes(minutes),
            )
            .await
            .unwrap();
        assert!(verdict.value.is_counted());
    }

    let escalation = harness
        .engine
        .check_escalation(&instance_id, t0() + Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(
        escalation.value,
        EscalationDecision::Escalate(PostFailureAction::Redistribute)
    );
    assert_eq!(escalation.instance.agent_id.as_ref().map(AgentId::as_str), Some("bruno"));

    let again = harness
        .engine
        .check_escalation(&instance_id, t0() + Duration::minutes(20))
        .await
        .unwrap_err();
    assert!(again.is_benign());

    let assignments = harness.collaborators.assignments().await;
    assert_eq!(assignments.len(), 2);
    assert_eq!(assignments[1].agent_id.as_str(), "bruno");
    assert_eq!(
        assignments[1].previous_agent_id.as_ref().map(AgentId::as_str),
        Some("ana")
    );

    let escalations = harness
        .engine
        .audit()
        .query(&AuditFilter::new().operation(OperationType::Escalation))
        .await
        .unwrap();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].broker.as_ref().map(AgentId::as_str), Some("bruno"));
    assert_eq!(
        escalations[0].previous_broker.as_ref().map(AgentId::as_str),
        Some("ana")
    );
}

#[tokio::test]
async fn attempts_below_threshold_keep_the_broker() {
    let harness = TestHarness::builder()
        .with_queue(fixtures::site_queue())
        .with_cadence(fixtures::welcome_cadence(3, PostFailureAction::Redistribute))
        .build()
        .await
        .unwrap();

    let report = harness.new_lead("l1", "Site").await.unwrap();
    let instance_id = report.started[0].clone();
    harness
        .engine
        .record_attempt(&instance_id, Channel::Call, AttemptResult::NoAnswer, t0())
        .await
        .unwrap();

    let decision = harness
        .engine
        .check_escalation(&instance_id, t0() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(
        decision.value,
        EscalationDecision::Pending {
            counted: 1,
            required: 3
        }
    );
    assert_eq!(harness.collaborators.assignments().await.len(), 1);
}

// ---- Test 3: Scheduler ticks ----

#[tokio::test]
async fn tick_dispatches_the_next_step_after_the_deadline() {
    let harness = TestHarness::builder()
        .with_queue(fixtures::site_queue())
        .with_cadence(fixtures::welcome_cadence(0, PostFailureAction::CreateManagerTask))
        .build()
        .await
        .unwrap();
    harness.new_lead("l1", "Site").await.unwrap();

    let early = harness.tick(t0() + Duration::minutes(30)).await.unwrap();
    assert_eq!(early.advanced, 0);

    let due = harness.tick(t0() + Duration::minutes(61)).await.unwrap();
    assert!(due.is_clean());
    assert_eq!(due.advanced, 1);

    let steps: Vec<_> = harness
        .collaborators
        .steps()
        .await
        .into_iter()
        .map(|s| s.step_id.to_string())
        .collect();
    assert_eq!(steps, ["whats", "ligar"]);
}

// ---- Test 4: Outcomes ----

#[tokio::test]
async fn closed_deal_moves_the_lead_to_post_sale() {
    let cadence = fixtures::welcome_cadence(0, PostFailureAction::CreateManagerTask).with_outcomes(
        OutcomeRules {
            on_deal_closed: OutcomeAction::MoveToPostSale { offset_days: 7 },
            ..OutcomeRules::default()
        },
    );
    let harness = TestHarness::builder()
        .with_queue(fixtures::site_queue())
        .with_cadence(cadence)
        .build()
        .await
        .unwrap();

    let report = harness.new_lead("l1", "Site").await.unwrap();
    let outcome = harness
        .engine
        .apply_outcome(
            &report.started[0],
            &OutcomeFlags::deal_closed(),
            t0() + Duration::hours(2),
        )
        .await
        .unwrap();
    assert!(!outcome.instance.is_open());

    let calls = harness.collaborators.calls().await;
    assert!(calls.iter().any(|call| matches!(
        call,
        Call::PostSale { lead_id, offset_days: 7 } if lead_id.as_str() == "l1"
    )));
}

// ---- Test 5: Collaborator failures ----

#[tokio::test]
async fn collaborator_failures_do_not_undo_the_assignment() {
    let harness = TestHarness::builder()
        .with_queue(fixtures::site_queue())
        .build()
        .await
        .unwrap();
    harness.collaborators.fail("notify_assignment").await;

    let report = harness.new_lead("l1", "Site").await.unwrap();
    assert_eq!(agent(&report), Some("ana"));
    assert_eq!(report.dispatch.errors.len(), 1);

    let next = harness.new_lead("l2", "Site").await.unwrap();
    assert_eq!(agent(&next), Some("bruno"));
}
