// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete engine over in-memory or temp SQLite
//! storage with [`RecordingCollaborators`], imports the given definitions,
//! and exposes helpers that drive leads through the pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use leadflow_config::{LeadflowConfig, StorageBackend};
use leadflow_core::model::{AuditFilter, Cadence, CadenceInstance, Queue, RedistributionHistoryItem};
use leadflow_core::{LeadEvent, LeadId, LeadflowError, Stores};
use leadflow_engine::{Engine, EventReport, TickReport};

use crate::fixtures;
use crate::recording::RecordingCollaborators;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    queues: Vec<Queue>,
    cadences: Vec<Cadence>,
    sqlite: bool,
    config: LeadflowConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            queues: Vec::new(),
            cadences: Vec::new(),
            sqlite: false,
            config: LeadflowConfig::default(),
        }
    }

    pub fn with_queue(mut self, queue: Queue) -> Self {
        self.queues.push(queue);
        self
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadences.push(cadence);
        self
    }

    /// Back the engine with a SQLite file in a temp directory instead of
    /// memory.
    pub fn with_sqlite(mut self) -> Self {
        self.sqlite = true;
        self
    }

    /// Start from a custom configuration. The storage section is replaced.
    pub fn with_config(mut self, config: LeadflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the harness and import the definitions.
    pub async fn build(self) -> Result<TestHarness, LeadflowError> {
        let mut config = self.config;
        let temp_dir = if self.sqlite {
            let dir = tempfile::TempDir::new().map_err(LeadflowError::storage)?;
            config.storage.backend = StorageBackend::Sqlite;
            config.storage.database_path = dir.path().join("leadflow.db").display().to_string();
            Some(dir)
        } else {
            config.storage.backend = StorageBackend::Memory;
            None
        };

        let stores = leadflow_storage::open_storage(&config.storage).await?;
        let collaborators = Arc::new(RecordingCollaborators::new());
        let engine = Engine::from_config(&config, stores, collaborators.clone());
        if !self.queues.is_empty() || !self.cadences.is_empty() {
            engine
                .import_definitions(self.queues, self.cadences)
                .await?;
        }

        Ok(TestHarness {
            engine: Arc::new(engine),
            collaborators,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete engine with recording collaborators and throwaway storage.
pub struct TestHarness {
    pub engine: Arc<Engine>,
    /// Every collaborator call the engine made.
    pub collaborators: Arc<RecordingCollaborators>,
    pub config: LeadflowConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn stores(&self) -> &Stores {
        self.engine.stores()
    }

    pub async fn send(&self, event: &LeadEvent) -> Result<EventReport, LeadflowError> {
        self.engine.handle_event(event).await
    }

    /// Deliver a new lead with the given `origem`, created at [`fixtures::t0`].
    pub async fn new_lead(&self, lead_id: &str, origin: &str) -> Result<EventReport, LeadflowError> {
        self.send(&fixtures::new_lead(lead_id, origin)).await
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, LeadflowError> {
        self.engine.tick(now).await
    }

    pub async fn instances(&self, lead_id: &str) -> Result<Vec<CadenceInstance>, LeadflowError> {
        self.engine.instances_for_lead(&LeadId::from(lead_id)).await
    }

    /// The full redistribution history, newest first.
    pub async fn history(&self) -> Result<Vec<RedistributionHistoryItem>, LeadflowError> {
        self.engine.audit().query(&AuditFilter::new()).await
    }
}
