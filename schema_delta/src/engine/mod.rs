//! External diff/apply engine
//!
//! The engine compares two live schemas, writes changelogs and applies them.
//! Everything schema_delta knows about it goes through [`DiffEngine`].

pub mod liquibase;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;

pub use liquibase::LiquibaseEngine;

/// Commands the orchestrator issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineCommand {
    Update,
    Diff,
    DiffChangeLog,
    UpdateSql,
    DropAll,
}

impl EngineCommand {
    /// Command name as the engine's command line expects it
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineCommand::Update => "update",
            EngineCommand::Diff => "diff",
            EngineCommand::DiffChangeLog => "diffChangeLog",
            EngineCommand::UpdateSql => "updateSQL",
            EngineCommand::DropAll => "dropAll",
        }
    }

    /// Whether the command compares against a reference schema
    pub fn needs_reference(&self) -> bool {
        matches!(self, EngineCommand::Diff | EngineCommand::DiffChangeLog)
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection and file settings for one engine invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Schema the command changes or reads as its target
    pub default_schema_name: String,
    pub reference_url: Option<String>,
    pub reference_username: Option<String>,
    pub reference_password: Option<String>,
    /// Schema treated as the desired state by diff commands
    pub reference_default_schema_name: Option<String>,
    pub change_log_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub classpath: Option<String>,
    pub driver: Option<String>,
    pub log_level: Option<String>,
    pub extra_args: Vec<String>,
}

impl EngineOptions {
    pub fn with_target(mut self, schema: impl Into<String>) -> Self {
        self.default_schema_name = schema.into();
        self
    }

    pub fn with_reference(mut self, schema: impl Into<String>) -> Self {
        self.reference_default_schema_name = Some(schema.into());
        self
    }

    pub fn with_change_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.change_log_file = Some(path.into());
        self
    }

    pub fn with_output(mut self, path: Option<PathBuf>) -> Self {
        self.output_file = path;
        self
    }
}

/// What an engine invocation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    /// The command ran for its side effect
    Done,
    /// Text the command printed: a diff report or generated SQL
    Text(String),
}

impl EngineOutput {
    pub fn into_text(self) -> String {
        match self {
            EngineOutput::Done => String::new(),
            EngineOutput::Text(text) => text,
        }
    }
}

/// The external diff/apply engine
#[async_trait]
pub trait DiffEngine: Send + Sync {
    async fn run(&self, command: EngineCommand, options: &EngineOptions) -> Result<EngineOutput>;
}
