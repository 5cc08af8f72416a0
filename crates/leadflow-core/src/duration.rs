// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relative duration specs such as `"in 24h"`, `"em 2d"`, or `"1h 30m"`.
//!
//! Step deadlines and attempt intervals are configured as human-written
//! relative durations. They are anchored to the moment a step becomes active,
//! never to wall-clock times.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

/// Upper bound on a single duration (about ten years).
const MAX_SECONDS: u64 = 3650 * DAY;

/// Words that denote a zero-length duration.
const IMMEDIATE_WORDS: &[&str] = &["now", "immediately", "imediato", "imediatamente", "agora"];

/// Prefixes stripped before parsing (`in 24h`, `em 24h`, `após 2d`).
const PREFIXES: &[&str] = &["in ", "em ", "após ", "apos ", "after "];

/// A relative duration with whole-second precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DurationSpec {
    seconds: u64,
}

/// Why a duration string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("missing number before unit `{0}`")]
    MissingNumber(String),
    #[error("unknown duration unit `{0}`")]
    UnknownUnit(String),
    #[error("duration `{0}` is too large")]
    Overflow(String),
}

impl DurationSpec {
    pub const ZERO: DurationSpec = DurationSpec { seconds: 0 };

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds: seconds.min(MAX_SECONDS),
        }
    }

    pub fn minutes(minutes: u64) -> Self {
        Self::from_seconds(minutes.saturating_mul(MINUTE))
    }

    pub fn hours(hours: u64) -> Self {
        Self::from_seconds(hours.saturating_mul(HOUR))
    }

    pub fn days(days: u64) -> Self {
        Self::from_seconds(days.saturating_mul(DAY))
    }

    pub fn as_seconds(&self) -> u64 {
        self.seconds
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0
    }

    /// Convert to a chrono duration for timestamp arithmetic.
    pub fn to_chrono(&self) -> chrono::Duration {
        // Bounded by MAX_SECONDS, well inside chrono's range.
        chrono::Duration::seconds(self.seconds as i64)
    }
}

impl FromStr for DurationSpec {
    type Err = DurationParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let lowered = input.trim().to_lowercase();
        let mut text = lowered.as_str();
        for prefix in PREFIXES {
            if let Some(rest) = text.strip_prefix(prefix) {
                text = rest.trim_start();
                break;
            }
        }
        if text.is_empty() {
            return Err(DurationParseError::Empty);
        }
        if IMMEDIATE_WORDS.contains(&text) {
            return Ok(Self::ZERO);
        }

        let mut total: u64 = 0;
        let mut chars = text.chars().peekable();
        while chars.peek().is_some() {
            while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
                chars.next();
            }
            let mut digits = String::new();
            while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(c);
                chars.next();
            }
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            let mut unit = String::new();
            while let Some(c) = chars.peek().copied().filter(|c| c.is_alphabetic()) {
                unit.push(c);
                chars.next();
            }
            if digits.is_empty() && unit.is_empty() {
                if chars.peek().is_some() {
                    let rest: String = chars.collect();
                    return Err(DurationParseError::UnknownUnit(rest));
                }
                break;
            }
            if digits.is_empty() {
                return Err(DurationParseError::MissingNumber(unit));
            }
            let amount: u64 = digits
                .parse()
                .map_err(|_| DurationParseError::Overflow(input.to_string()))?;
            // A bare number means seconds.
            let multiplier = if unit.is_empty() {
                1
            } else {
                unit_seconds(&unit).ok_or_else(|| DurationParseError::UnknownUnit(unit.clone()))?
            };
            total = amount
                .checked_mul(multiplier)
                .and_then(|secs| total.checked_add(secs))
                .filter(|secs| *secs <= MAX_SECONDS)
                .ok_or_else(|| DurationParseError::Overflow(input.to_string()))?;
        }
        Ok(Self { seconds: total })
    }
}

fn unit_seconds(unit: &str) -> Option<u64> {
    let secs = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" | "seg" | "segundo" | "segundos" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" | "minuto" | "minutos" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" | "hora" | "horas" => HOUR,
        "d" | "day" | "days" | "dia" | "dias" => DAY,
        "w" | "wk" | "week" | "weeks" | "semana" | "semanas" => WEEK,
        _ => return None,
    };
    Some(secs)
}

impl fmt::Display for DurationSpec {
    /// Canonical compact form: `1d 2h`, `30m`, `0s`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds == 0 {
            return f.write_str("0s");
        }
        let mut remaining = self.seconds;
        let mut parts = Vec::new();
        for (unit, size) in [("d", DAY), ("h", HOUR), ("m", MINUTE), ("s", 1)] {
            let count = remaining / size;
            if count > 0 {
                parts.push(format!("{count}{unit}"));
                remaining %= size;
            }
        }
        f.write_str(&parts.join(" "))
    }
}

impl Serialize for DurationSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DurationSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Seconds(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Seconds(seconds) => Ok(DurationSpec::from_seconds(seconds)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_specs() {
        assert_eq!("in 24h".parse::<DurationSpec>().unwrap(), DurationSpec::hours(24));
        assert_eq!("em 2 dias".parse::<DurationSpec>().unwrap(), DurationSpec::days(2));
        assert_eq!("após 30min".parse::<DurationSpec>().unwrap(), DurationSpec::minutes(30));
    }

    #[test]
    fn parses_compound_specs() {
        let parsed: DurationSpec = "1h 30m".parse().unwrap();
        assert_eq!(parsed.as_seconds(), 5400);
        let parsed: DurationSpec = "1d,2h".parse().unwrap();
        assert_eq!(parsed.as_seconds(), DAY + 2 * HOUR);
        let parsed: DurationSpec = "2 semanas".parse().unwrap();
        assert_eq!(parsed.as_seconds(), 2 * WEEK);
    }

    #[test]
    fn immediate_words_are_zero() {
        assert!("Imediato".parse::<DurationSpec>().unwrap().is_zero());
        assert!("now".parse::<DurationSpec>().unwrap().is_zero());
        assert!("0".parse::<DurationSpec>().unwrap().is_zero());
    }

    #[test]
    fn rejects_malformed_specs() {
        assert_eq!("".parse::<DurationSpec>(), Err(DurationParseError::Empty));
        assert_eq!("   ".parse::<DurationSpec>(), Err(DurationParseError::Empty));
        assert!(matches!(
            "24 parsecs".parse::<DurationSpec>(),
            Err(DurationParseError::UnknownUnit(_))
        ));
        assert!(matches!(
            "h".parse::<DurationSpec>(),
            Err(DurationParseError::MissingNumber(_))
        ));
        assert!(matches!(
            "99999999999999999999d".parse::<DurationSpec>(),
            Err(DurationParseError::Overflow(_))
        ));
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(DurationSpec::hours(26).to_string(), "1d 2h");
        assert_eq!(DurationSpec::minutes(30).to_string(), "30m");
        assert_eq!(DurationSpec::ZERO.to_string(), "0s");
    }

    #[test]
    fn serde_accepts_text_and_seconds() {
        let parsed: DurationSpec = serde_json::from_str("\"in 24h\"").unwrap();
        assert_eq!(parsed, DurationSpec::hours(24));
        let parsed: DurationSpec = serde_json::from_str("3600").unwrap();
        assert_eq!(parsed, DurationSpec::hours(1));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"1h\"");
    }

    #[test]
    fn to_chrono_matches_seconds() {
        assert_eq!(DurationSpec::days(1).to_chrono(), chrono::Duration::hours(24));
    }
}
