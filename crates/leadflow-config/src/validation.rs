// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks run after deserialization.
//!
//! All checks run; the caller receives every problem at once.

use crate::diagnostic::ConfigError;
use crate::model::{LeadflowConfig, StorageBackend};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &LeadflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.engine.name.trim().is_empty() {
        errors.push(ConfigError::validation("engine.name", "must not be empty"));
    }
    let level = config.engine.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::validation(
            "engine.log_level",
            format!(
                "`{}` is not one of {}",
                config.engine.log_level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }
    if !(-840..=840).contains(&config.engine.utc_offset_minutes) {
        errors.push(ConfigError::validation(
            "engine.utc_offset_minutes",
            format!("{} is outside -840..=840", config.engine.utc_offset_minutes),
        ));
    }

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "storage.database_path",
            "must not be empty when backend = \"sqlite\"",
        ));
    }

    if config.assignment.max_retries > 100 {
        errors.push(ConfigError::validation(
            "assignment.max_retries",
            format!("{} is more than 100", config.assignment.max_retries),
        ));
    }

    if config.scheduler.tick_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "scheduler.tick_interval_secs",
            "must be at least 1",
        ));
    }
    if config.scheduler.max_parallel_instances == 0 {
        errors.push(ConfigError::validation(
            "scheduler.max_parallel_instances",
            "must be at least 1",
        ));
    }
    if config.scheduler.default_step_deadline.is_zero() {
        errors.push(ConfigError::validation(
            "scheduler.default_step_deadline",
            "must be longer than zero",
        ));
    }

    if config.audit.default_lookback_days == 0 {
        errors.push(ConfigError::validation(
            "audit.default_lookback_days",
            "must be at least 1",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
