// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Leadflow engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use leadflow_core::DurationSpec;
use serde::{Deserialize, Serialize};

/// Top-level Leadflow configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadflowConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Queue assignment behaviour.
    #[serde(default)]
    pub assignment: AssignmentConfig,

    /// Cadence tick loop settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Redistribution history settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Engine identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Name used in log lines and metrics labels.
    #[serde(default = "default_engine_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Offset applied to queues whose check-in policy omits one, in minutes.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            log_level: default_log_level(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

fn default_engine_name() -> String {
    "leadflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_utc_offset_minutes() -> i32 {
    -180
}

/// Which repository backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("leadflow").join("leadflow.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("leadflow.db"))
        .display()
        .to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentConfig {
    /// Retries after losing an optimistic version check.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Try the configured overflow queue when a queue has nobody eligible.
    #[serde(default = "default_true")]
    pub overflow_enabled: bool,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            overflow_enabled: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Seconds between ticks when the engine drives its own timer.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Instances advanced concurrently within one tick.
    #[serde(default = "default_max_parallel_instances")]
    pub max_parallel_instances: usize,

    /// Deadline used by steps created without one (e.g. `"in 24h"`).
    #[serde(default = "default_step_deadline")]
    pub default_step_deadline: DurationSpec,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            max_parallel_instances: default_max_parallel_instances(),
            default_step_deadline: default_step_deadline(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_max_parallel_instances() -> usize {
    32
}

fn default_step_deadline() -> DurationSpec {
    DurationSpec::hours(24)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Record distribution and redistribution history.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Window used by `audit` queries without an explicit start date.
    #[serde(default = "default_lookback_days")]
    pub default_lookback_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_lookback_days: default_lookback_days(),
        }
    }
}

fn default_lookback_days() -> u32 {
    30
}
