// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for the Leadflow engine.
//!
//! Two backends implement the repository traits from `leadflow-core`:
//! [`MemoryStorage`] for tests and dry runs, and [`SqliteStorage`], which
//! keeps definitions and instances as JSON documents next to an append-only
//! redistribution history guarded by SQL triggers.

pub mod adapter;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod queries;

use std::sync::Arc;

use leadflow_config::model::StorageConfig;
use leadflow_config::StorageBackend;
use leadflow_core::{LeadflowError, Stores};
use tracing::info;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use memory::MemoryStorage;

/// Open the backend selected by configuration.
pub async fn open_storage(config: &StorageConfig) -> Result<Stores, LeadflowError> {
    match config.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage");
            Ok(Stores::new(Arc::new(MemoryStorage::new())))
        }
        StorageBackend::Sqlite => {
            info!(path = %config.database_path, "using sqlite storage");
            let storage = SqliteStorage::open(&config.database_path, config.wal_mode).await?;
            Ok(Stores::new(Arc::new(storage)))
        }
    }
}
