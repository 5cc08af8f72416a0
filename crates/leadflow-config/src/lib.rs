// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Leadflow engine.
//!
//! TOML files layered with `LEADFLOW_*` environment overrides, strict key
//! checking (`deny_unknown_fields`), semantic validation, and miette
//! diagnostics with typo suggestions.
//!
//! ```no_run
//! use leadflow_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("storage backend: {:?}", config.storage.backend);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{LeadflowConfig, StorageBackend};

/// Load from the standard hierarchy and validate.
pub fn load_and_validate() -> Result<LeadflowConfig, Vec<ConfigError>> {
    let config = loader::load_config()
        .map_err(|err| diagnostic::figment_to_config_errors(err, &standard_sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Load a single explicit file (plus env overrides) and validate.
pub fn load_and_validate_path(path: &Path) -> Result<LeadflowConfig, Vec<ConfigError>> {
    let config = loader::load_config_from_path(path).map_err(|err| {
        let sources = read_source(path).into_iter().collect::<Vec<_>>();
        diagnostic::figment_to_config_errors(err, &sources)
    })?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Load from an inline TOML string and validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<LeadflowConfig, Vec<ConfigError>> {
    let config = loader::load_config_from_str(toml_content).map_err(|err| {
        let sources = [("<inline>".to_string(), toml_content.to_string())];
        diagnostic::figment_to_config_errors(err, &sources)
    })?;
    validation::validate_config(&config)?;
    Ok(config)
}

fn read_source(path: &Path) -> Option<(String, String)> {
    std::fs::read_to_string(path)
        .ok()
        .map(|content| (path.display().to_string(), content))
}

/// Contents of whichever standard config files exist, for span lookup.
fn standard_sources() -> Vec<(String, String)> {
    let local = std::env::current_dir()
        .map(|d| d.join("leadflow.toml"))
        .unwrap_or_else(|_| "leadflow.toml".into());
    let user = dirs::config_dir().map(|d| d.join("leadflow/leadflow.toml"));
    let system = Path::new("/etc/leadflow/leadflow.toml").to_path_buf();

    [Some(local), user, Some(system)]
        .into_iter()
        .flatten()
        .filter_map(|path| read_source(&path))
        .collect()
}
