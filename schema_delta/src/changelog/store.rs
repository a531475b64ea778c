//! Changelog persistence
//!
//! Changelogs are stored in the Liquibase document layout:
//!
//! ```yaml
//! databaseChangeLog:
//!   - changeSet:
//!       id: 1700000000000-1
//!       author: generated
//!       changes:
//!         - dropView:
//!             viewName: books_view
//! ```
//!
//! YAML is used for `.yaml`/`.yml` files and JSON for `.json` files.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::changelog::types::{ChangeLog, ChangeSet};
use crate::error::{Error, Result};

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(rename = "databaseChangeLog")]
    database_change_log: Vec<Entry>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Entry {
    #[serde(rename = "changeSet")]
    change_set: ChangeSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    fn for_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            Some("json") => Ok(Format::Json),
            _ => Err(Error::ConfigError(format!(
                "Unsupported changelog format for {} (expected .yaml, .yml or .json)",
                path.display()
            ))),
        }
    }
}

impl ChangeLog {
    /// Parse the changelog stored at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<ChangeLog> {
        let path = path.as_ref();
        let format = Format::for_path(path)?;
        let contents = fs::read_to_string(path)?;

        let document: Document = match format {
            Format::Yaml => serde_yaml::from_str(&contents).map_err(|e| Error::malformed(path, e))?,
            Format::Json => serde_json::from_str(&contents).map_err(|e| Error::malformed(path, e))?,
        };

        let mut change_sets = Vec::with_capacity(document.database_change_log.len());
        for entry in document.database_change_log {
            if entry.change_set.changes().is_empty() {
                return Err(Error::malformed(
                    path,
                    format!("changeSet {} has no changes", entry.change_set.id()),
                ));
            }
            change_sets.push(entry.change_set);
        }

        tracing::debug!(path = %path.display(), change_sets = change_sets.len(), "Loaded changelog");
        Ok(ChangeLog::new(change_sets))
    }

    /// Serialize the changelog to `path`, replacing whatever was there
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = Format::for_path(path)?;

        let document = Document {
            database_change_log: self
                .iter()
                .cloned()
                .map(|change_set| Entry { change_set })
                .collect(),
        };

        let contents = match format {
            Format::Yaml => serde_yaml::to_string(&document)?,
            Format::Json => serde_json::to_string_pretty(&document)?,
        };
        fs::write(path, contents)?;

        tracing::debug!(path = %path.display(), change_sets = self.len(), "Saved changelog");
        Ok(())
    }
}
