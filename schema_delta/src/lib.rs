//! schema_delta: delta deployments of a declarative data model
//!
//! The model is deployed into a throwaway reference schema, production is
//! copied into a throwaway clone schema, and an external diff engine turns the
//! difference into a changelog. That changelog is post-processed (view drops
//! first, no table drops unless asked, undeploy list honored, dependency
//! ordering) and applied to production, or rendered as SQL for a dry run.

pub mod backend;
pub mod changelog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod schema;
pub mod utils;

// Re-export main types for easier access
pub use backend::{DeployBackend, PostgresBackend, SchemaNames};
pub use changelog::{ChangeLog, ChangeSet, ProcessingPolicy, ScratchDir, UndeployList};
pub use config::Config;
pub use db::connection::DatabaseConnection;
pub use engine::{DiffEngine, EngineCommand, EngineOptions, EngineOutput, LiquibaseEngine};
pub use error::{Error, Result};
pub use orchestrator::{DeployOptions, DeployOutcome, LoadMode, Orchestrator, OrchestratorSettings};
pub use schema::compiler::ModelCompiler;

/// Initialize schema_delta with the specified configuration file
pub async fn init(config_path: &str) -> Result<Orchestrator> {
    let config = config::load_from_file(config_path)?;
    Orchestrator::from_config(&config).await
}
