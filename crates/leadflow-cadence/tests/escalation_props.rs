// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{Duration, TimeZone, Utc};
use leadflow_cadence::{EscalationDecision, RetryEscalationPolicy};
use leadflow_core::model::{AttemptPolicy, AttemptResult, CadenceInstance, PostFailureAction};
use leadflow_core::types::Channel;
use leadflow_core::DurationSpec;
use proptest::prelude::*;

fn channel() -> impl Strategy<Value = Channel> {
    prop_oneof![
        Just(Channel::Whatsapp),
        Just(Channel::Call),
        Just(Channel::Email),
        Just(Channel::ScheduleVisit),
    ]
}

proptest! {
    #[test]
    fn escalation_fires_at_most_once(
        minimum in 1u32..5,
        attempts in prop::collection::vec((channel(), 0i64..180), 0..20),
    ) {
        let policy = AttemptPolicy {
            minimum_required_attempts: minimum,
            interval_between_attempts: DurationSpec::minutes(30),
            allowed_channels: vec![Channel::Whatsapp, Channel::Call],
            post_failure_action: PostFailureAction::Redistribute,
            ..AttemptPolicy::default()
        };
        let retry = RetryEscalationPolicy::new(&policy);
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let mut inst = CadenceInstance::new("lead".into(), "c".into(), start);
        let mut at = start;
        let mut fired = 0;

        for (channel, gap) in attempts {
            at += Duration::minutes(gap);
            retry.record_attempt(&mut inst, channel, AttemptResult::NoAnswer, at);
            match retry.check_threshold(&mut inst, at) {
                Ok(EscalationDecision::Escalate(_)) => fired += 1,
                Ok(EscalationDecision::Pending { counted, required }) => {
                    prop_assert!(counted < required);
                }
                Ok(other) => prop_assert!(false, "unexpected decision {:?}", other),
                Err(err) => prop_assert!(err.is_benign()),
            }
        }

        prop_assert!(fired <= 1);
        prop_assert_eq!(fired == 1, inst.counted_attempts >= minimum);
        prop_assert!(inst.total_attempts() >= inst.counted_attempts);
    }
}
