// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue and cadence definition files, and the `check` and `import`
//! commands that consume them.
//!
//! A definitions file is TOML (or JSON, by extension) with two optional
//! arrays:
//!
//! ```toml
//! [[queues]]
//! id = "site"
//! name = "Leads do site"
//! rules = [{ field = "origem", operator = "equals", value = "Site" }]
//! members = [{ userId = "ana" }, { userId = "bruno" }]
//!
//! [[cadences]]
//! id = "boas-vindas"
//! name = "Boas-vindas"
//! trigger = { type = "new-lead" }
//! ```

use std::io::IsTerminal;
use std::path::Path;

use leadflow_core::LeadflowError;
use leadflow_core::model::{Cadence, Queue};
use leadflow_core::validation::{cadence_errors, queue_errors, validate_definitions};
use leadflow_engine::Engine;
use serde::Deserialize;

/// Contents of one definitions file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Definitions {
    #[serde(default, alias = "filas")]
    pub queues: Vec<Queue>,
    #[serde(default, alias = "cadencias")]
    pub cadences: Vec<Cadence>,
}

impl Definitions {
    /// Parse `path`, choosing the format from its extension.
    pub fn load(path: &Path) -> Result<Self, LeadflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LeadflowError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, LeadflowError> {
        toml::from_str(content)
            .map_err(|e| LeadflowError::Config(format!("invalid definitions: {e}")))
    }

    pub fn from_json(content: &str) -> Result<Self, LeadflowError> {
        serde_json::from_str(content)
            .map_err(|e| LeadflowError::Config(format!("invalid definitions: {e}")))
    }

    /// Problems with each definition, keyed by a `queue <id>` or
    /// `cadence <id>` label. Definitions without problems are omitted.
    pub fn problems(&self) -> Vec<(String, Vec<String>)> {
        let queues = self
            .queues
            .iter()
            .map(|q| (format!("queue {}", q.id), queue_errors(q)));
        let cadences = self
            .cadences
            .iter()
            .map(|c| (format!("cadence {}", c.id), cadence_errors(c)));
        queues
            .chain(cadences)
            .filter(|(_, errors)| !errors.is_empty())
            .collect()
    }
}

/// Run the `leadflow check` command.
///
/// Prints one line per definition and fails if any is invalid, including
/// cross-definition problems such as duplicate ids.
pub fn run_check(path: &Path, plain: bool) -> Result<(), LeadflowError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let definitions = Definitions::load(path)?;
    let problems = definitions.problems();

    let labels = definitions
        .queues
        .iter()
        .map(|q| format!("queue {}", q.id))
        .chain(definitions.cadences.iter().map(|c| format!("cadence {}", c.id)));
    for label in labels {
        match problems.iter().find(|(l, _)| *l == label) {
            Some((_, errors)) => {
                println!("  {} {label}", symbol(false, use_color));
                for error in errors {
                    println!("      {error}");
                }
            }
            None => println!("  {} {label}", symbol(true, use_color)),
        }
    }

    validate_definitions(&definitions.queues, &definitions.cadences)?;
    println!(
        "\n{} queue(s) and {} cadence(s) are valid",
        definitions.queues.len(),
        definitions.cadences.len()
    );
    Ok(())
}

/// Run the `leadflow import` command.
pub async fn run_import(engine: &Engine, path: &Path) -> Result<(), LeadflowError> {
    let definitions = Definitions::load(path)?;
    let report = engine
        .import_definitions(definitions.queues, definitions.cadences)
        .await?;
    println!(
        "imported {} queue(s) and {} cadence(s)",
        report.queues, report.cadences
    );
    Ok(())
}

fn symbol(ok: bool, use_color: bool) -> String {
    use colored::Colorize;
    match (ok, use_color) {
        (true, true) => "✓".green().to_string(),
        (true, false) => "✓".to_string(),
        (false, true) => "✗".red().to_string(),
        (false, false) => "✗".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r#"
[[queues]]
id = "site"
name = "Leads do site"
position = 1
rules = [{ field = "origem", operator = "equals", value = "Site" }]
members = [{ userId = "ana" }, { userId = "bruno" }]
"#;

    #[test]
    fn parses_toml_definitions() {
        let definitions = Definitions::from_toml(SITE).unwrap();
        assert_eq!(definitions.queues.len(), 1);
        assert_eq!(definitions.queues[0].members.len(), 2);
        assert!(definitions.cadences.is_empty());
        assert!(definitions.problems().is_empty());
    }

    #[test]
    fn reports_queue_without_rules() {
        let definitions =
            Definitions::from_json(r#"{"queues": [{"id": "vazia", "name": "Vazia"}]}"#).unwrap();
        let problems = definitions.problems();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].0, "queue vazia");
    }

    #[test]
    fn rejects_unknown_sections() {
        assert!(Definitions::from_toml("[[agents]]\nid = \"ana\"\n").is_err());
    }

    #[test]
    fn load_picks_format_from_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("defs.json");
        std::fs::write(&path, r#"{"queues": []}"#).unwrap();
        assert!(Definitions::load(&path).unwrap().queues.is_empty());

        let path = dir.path().join("defs.toml");
        std::fs::write(&path, SITE).unwrap();
        assert_eq!(Definitions::load(&path).unwrap().queues.len(), 1);
    }
}
