// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mandatory attempt counting and the one-shot escalation latch.
//!
//! Every attempt bumps its channel counter. Only attempts on an allowed
//! channel, spaced at least `interval_between_attempts` after the previous
//! counted one, add to the running total the threshold is checked against.

use chrono::{DateTime, Utc};
use leadflow_core::LeadflowError;
use leadflow_core::model::{
    AttemptPolicy, AttemptResult, CadenceInstance, EscalationState, ExpectedOutcome,
    PostFailureAction,
};
use leadflow_core::types::Channel;
use tracing::{debug, info};

/// How a recorded attempt was treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Added to the running total, which is now `counted`.
    Counted { counted: u32 },
    /// Logged only: the channel is outside the allowed list.
    ChannelNotAllowed,
    /// Logged only: too close to the previous counted attempt.
    WithinInterval { next_allowed_at: DateTime<Utc> },
}

impl AttemptVerdict {
    pub fn is_counted(self) -> bool {
        matches!(self, AttemptVerdict::Counted { .. })
    }
}

/// Result of [`RetryEscalationPolicy::check_threshold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationDecision {
    /// The cadence requires no attempts.
    NotRequired,
    /// Below the minimum with the expected outcome not yet met.
    Pending { counted: u32, required: u32 },
    /// The expected outcome was met.
    Satisfied,
    /// Threshold crossed without the expected outcome. Returned once.
    Escalate(PostFailureAction),
}

/// Attempt accounting for one cadence's attempt policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryEscalationPolicy<'a> {
    policy: &'a AttemptPolicy,
}

impl<'a> RetryEscalationPolicy<'a> {
    pub fn new(policy: &'a AttemptPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AttemptPolicy {
        self.policy
    }

    pub fn record_attempt(
        &self,
        instance: &mut CadenceInstance,
        channel: Channel,
        result: AttemptResult,
        at: DateTime<Utc>,
    ) -> AttemptVerdict {
        *instance.attempts_per_channel.entry(channel).or_insert(0) += 1;
        instance.last_attempt_at = Some(at);
        if result == AttemptResult::ContactEstablished {
            instance.contact_established = true;
        }

        let verdict = if !self.policy.counts_channel(channel) {
            AttemptVerdict::ChannelNotAllowed
        } else {
            let interval = self.policy.interval_between_attempts.to_chrono();
            match instance.last_counted_attempt_at {
                Some(previous) if at < previous + interval => AttemptVerdict::WithinInterval {
                    next_allowed_at: previous + interval,
                },
                _ => {
                    instance.counted_attempts += 1;
                    instance.last_counted_attempt_at = Some(at);
                    AttemptVerdict::Counted {
                        counted: instance.counted_attempts,
                    }
                }
            }
        };

        debug!(
            instance_id = %instance.id,
            channel = %channel,
            result = %result,
            counted = verdict.is_counted(),
            total = instance.counted_attempts,
            "attempt recorded"
        );
        verdict
    }

    /// Whether the expected outcome has been met.
    pub fn is_satisfied(&self, instance: &CadenceInstance) -> bool {
        match self.policy.expected_outcome {
            ExpectedOutcome::ContactEstablished => instance.contact_established,
            ExpectedOutcome::NoResponse => {
                instance.counted_attempts >= self.policy.minimum_required_attempts
            }
        }
    }

    /// Evaluate the threshold, latching the escalation when it fires.
    ///
    /// After an `Escalate` this returns
    /// [`LeadflowError::EscalationAlreadyHandled`] until [`reset`](Self::reset).
    pub fn check_threshold(
        &self,
        instance: &mut CadenceInstance,
        now: DateTime<Utc>,
    ) -> Result<EscalationDecision, LeadflowError> {
        if !self.policy.is_required() {
            return Ok(EscalationDecision::NotRequired);
        }
        if instance.escalation_fired() {
            return Err(LeadflowError::EscalationAlreadyHandled {
                instance_id: instance.id.to_string(),
            });
        }
        if self.is_satisfied(instance) {
            return Ok(EscalationDecision::Satisfied);
        }
        let required = self.policy.minimum_required_attempts;
        if instance.counted_attempts < required {
            return Ok(EscalationDecision::Pending {
                counted: instance.counted_attempts,
                required,
            });
        }

        let action = self.policy.post_failure_action;
        instance.escalation = EscalationState::Fired { action, at: now };
        instance.updated_at = now;
        info!(
            instance_id = %instance.id,
            lead_id = %instance.lead_id,
            action = ?action,
            counted = instance.counted_attempts,
            "attempt threshold crossed, escalating"
        );
        Ok(EscalationDecision::Escalate(action))
    }

    /// Clear counters and re-arm the latch.
    pub fn reset(&self, instance: &mut CadenceInstance) {
        instance.attempts_per_channel.clear();
        instance.counted_attempts = 0;
        instance.contact_established = false;
        instance.escalation = EscalationState::Armed;
        instance.last_attempt_at = None;
        instance.last_counted_attempt_at = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use leadflow_core::DurationSpec;
    use tracing_test::traced_test;

    use super::*;

    fn policy(minimum: u32) -> AttemptPolicy {
        AttemptPolicy {
            minimum_required_attempts: minimum,
            post_failure_action: PostFailureAction::Redistribute,
            ..AttemptPolicy::default()
        }
    }

    fn instance() -> CadenceInstance {
        CadenceInstance::new("lead-1".into(), "c1".into(), Utc::now())
    }

    #[test]
    fn escalates_exactly_once_at_minimum_three() {
        let policy = policy(3);
        let retry = RetryEscalationPolicy::new(&policy);
        let mut inst = instance();
        let start = Utc::now();

        for n in 0..2 {
            retry.record_attempt(&mut inst, Channel::Call, AttemptResult::NoAnswer, start);
            assert_eq!(
                retry.check_threshold(&mut inst, start).unwrap(),
                EscalationDecision::Pending {
                    counted: n + 1,
                    required: 3
                }
            );
        }
        retry.record_attempt(&mut inst, Channel::Call, AttemptResult::NoAnswer, start);
        assert_eq!(
            retry.check_threshold(&mut inst, start).unwrap(),
            EscalationDecision::Escalate(PostFailureAction::Redistribute)
        );

        // Further attempts and checks never fire again.
        retry.record_attempt(&mut inst, Channel::Call, AttemptResult::NoAnswer, start);
        for _ in 0..3 {
            let err = retry.check_threshold(&mut inst, start).unwrap_err();
            assert!(err.is_benign());
        }
    }

    #[test]
    fn reset_rearms_the_latch() {
        let policy = policy(1);
        let retry = RetryEscalationPolicy::new(&policy);
        let mut inst = instance();
        let now = Utc::now();
        retry.record_attempt(&mut inst, Channel::Whatsapp, AttemptResult::NoAnswer, now);
        assert!(matches!(
            retry.check_threshold(&mut inst, now),
            Ok(EscalationDecision::Escalate(_))
        ));
        retry.reset(&mut inst);
        assert_eq!(inst.counted_attempts, 0);
        assert_eq!(
            retry.check_threshold(&mut inst, now).unwrap(),
            EscalationDecision::Pending {
                counted: 0,
                required: 1
            }
        );
    }

    #[test]
    fn disallowed_channels_are_logged_not_counted() {
        let mut policy = policy(2);
        policy.allowed_channels = vec![Channel::Whatsapp, Channel::Call];
        let retry = RetryEscalationPolicy::new(&policy);
        let mut inst = instance();
        let verdict =
            retry.record_attempt(&mut inst, Channel::Email, AttemptResult::NoAnswer, Utc::now());
        assert_eq!(verdict, AttemptVerdict::ChannelNotAllowed);
        assert_eq!(inst.counted_attempts, 0);
        assert_eq!(inst.attempts_per_channel.get(&Channel::Email), Some(&1));
    }

    #[test]
    fn attempts_inside_the_interval_are_not_counted() {
        let mut policy = policy(2);
        policy.interval_between_attempts = DurationSpec::hours(4);
        let retry = RetryEscalationPolicy::new(&policy);
        let mut inst = instance();
        let start = Utc::now();

        assert!(retry.record_attempt(&mut inst, Channel::Call, AttemptResult::NoAnswer, start).is_counted());
        let early = retry.record_attempt(
            &mut inst,
            Channel::Call,
            AttemptResult::NoAnswer,
            start + Duration::hours(1),
        );
        assert_eq!(
            early,
            AttemptVerdict::WithinInterval {
                next_allowed_at: start + Duration::hours(4)
            }
        );
        let on_time = retry.record_attempt(
            &mut inst,
            Channel::Call,
            AttemptResult::NoAnswer,
            start + Duration::hours(4),
        );
        assert_eq!(on_time, AttemptVerdict::Counted { counted: 2 });
        assert_eq!(inst.total_attempts(), 3);
    }

    #[test]
    fn contact_established_satisfies_before_minimum() {
        let policy = policy(3);
        let retry = RetryEscalationPolicy::new(&policy);
        let mut inst = instance();
        let now = Utc::now();
        retry.record_attempt(&mut inst, Channel::Call, AttemptResult::ContactEstablished, now);
        assert_eq!(
            retry.check_threshold(&mut inst, now).unwrap(),
            EscalationDecision::Satisfied
        );
        assert!(!inst.escalation_fired());
    }

    #[test]
    fn touch_only_sequences_are_satisfied_by_the_count() {
        let mut policy = policy(2);
        policy.expected_outcome = ExpectedOutcome::NoResponse;
        let retry = RetryEscalationPolicy::new(&policy);
        let mut inst = instance();
        let now = Utc::now();
        retry.record_attempt(&mut inst, Channel::Email, AttemptResult::NoAnswer, now);
        assert!(matches!(
            retry.check_threshold(&mut inst, now),
            Ok(EscalationDecision::Pending { .. })
        ));
        retry.record_attempt(&mut inst, Channel::Email, AttemptResult::NoAnswer, now);
        assert_eq!(
            retry.check_threshold(&mut inst, now).unwrap(),
            EscalationDecision::Satisfied
        );
    }

    #[test]
    #[traced_test]
    fn escalation_is_logged_with_the_action() {
        let policy = policy(1);
        let retry = RetryEscalationPolicy::new(&policy);
        let mut inst = instance();
        let now = Utc::now();
        retry.record_attempt(&mut inst, Channel::Call, AttemptResult::NoAnswer, now);
        retry.check_threshold(&mut inst, now).unwrap();
        assert!(logs_contain("attempt threshold crossed"));
        assert!(logs_contain("Redistribute"));
    }

    #[test]
    fn zero_minimum_is_not_required() {
        let policy = policy(0);
        let retry = RetryEscalationPolicy::new(&policy);
        let mut inst = instance();
        assert_eq!(
            retry.check_threshold(&mut inst, Utc::now()).unwrap(),
            EscalationDecision::NotRequired
        );
    }
}
