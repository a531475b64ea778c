//! Deployment backends
//!
//! A backend knows how to reach one kind of database: it builds engine
//! options and runs the few SQL operations the orchestrator needs. The
//! clone, strip and reference stages are written once here on top of those
//! primitives.

pub mod postgres;

use async_trait::async_trait;

use crate::changelog::{ChangeLog, ScratchDir};
use crate::engine::{DiffEngine, EngineCommand, EngineOptions};
use crate::error::Result;
use crate::schema::statement::{ensure_unqualified, DdlStatement};

pub use postgres::PostgresBackend;

/// Names of the schemas one deploy run works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNames {
    /// Production schema
    pub default: String,
    /// Throwaway copy of production used as the diff baseline
    pub clone: String,
    /// Throwaway schema holding the compiled model
    pub reference: String,
}

impl From<&crate::config::SchemaConfig> for SchemaNames {
    fn from(config: &crate::config::SchemaConfig) -> Self {
        Self {
            default: config.default.clone(),
            clone: config.clone.clone(),
            reference: config.reference.clone(),
        }
    }
}

#[async_trait]
pub trait DeployBackend: Send + Sync {
    fn schemas(&self) -> &SchemaNames;

    /// Engine options for `command`, targeting the default schema
    ///
    /// Diff commands also point the reference side at the reference schema.
    fn options_for(&self, command: EngineCommand) -> EngineOptions;

    /// Drop `schema` with everything in it and create it empty
    async fn recreate_schema(&self, schema: &str) -> Result<()>;

    /// Run `statements` inside `schema` as one transaction
    async fn execute_in_schema(&self, schema: &str, statements: &[String]) -> Result<()>;

    /// Drop `schema` with everything in it, if it exists
    async fn drop_schema(&self, schema: &str) -> Result<()>;

    /// Drop the given views and tables from `schema` as one transaction
    async fn drop_entities(&self, schema: &str, entities: &[DdlStatement]) -> Result<()>;

    /// Remove the clone and reference schemas at the end of a run
    ///
    /// Failures are only logged: the next run recreates both schemas anyway.
    async fn drop_scratch_schemas(&self) {
        let schemas = self.schemas().clone();
        for schema in [&schemas.clone, &schemas.reference] {
            if let Err(e) = self.drop_schema(schema).await {
                tracing::warn!(schema = %schema, error = %e, "Failed to drop scratch schema");
            }
        }
    }

    /// Make the clone schema a structural copy of the default schema
    async fn synchronize_clone(&self, engine: &dyn DiffEngine, scratch: &ScratchDir) -> Result<()> {
        let schemas = self.schemas().clone();
        tracing::info!(clone = %schemas.clone, source = %schemas.default, "Synchronizing clone schema");

        self.recreate_schema(&schemas.clone).await?;

        let baseline = scratch.persist("baseline", &ChangeLog::default())?;
        let options = self
            .options_for(EngineCommand::Update)
            .with_target(&schemas.clone)
            .with_change_log(baseline.path());
        engine.run(EngineCommand::Update, &options).await?;
        drop(baseline);

        let copy = scratch.allocate("clone")?;
        let options = self
            .options_for(EngineCommand::DiffChangeLog)
            .with_target(&schemas.clone)
            .with_reference(&schemas.default)
            .with_change_log(copy.path());
        engine.run(EngineCommand::DiffChangeLog, &options).await?;

        if !copy.path().exists() {
            tracing::debug!("Default schema is empty, clone stays empty");
            return Ok(());
        }
        let changes = ChangeLog::load(copy.path())?;
        tracing::debug!(change_sets = changes.len(), "Applying clone changelog");

        let options = self
            .options_for(EngineCommand::Update)
            .with_target(&schemas.clone)
            .with_change_log(copy.path());
        engine.run(EngineCommand::Update, &options).await?;

        Ok(())
    }

    /// Remove the given views from the clone schema
    async fn drop_views_from_clone(&self, views: &[DdlStatement]) -> Result<()> {
        let views: Vec<DdlStatement> = views.iter().filter(|ddl| ddl.is_view()).cloned().collect();
        tracing::info!(clone = %self.schemas().clone, views = views.len(), "Dropping views from clone schema");

        if views.is_empty() {
            return Ok(());
        }
        let clone = self.schemas().clone.clone();
        self.drop_entities(&clone, &views).await
    }

    /// Deploy ordered model statements into a freshly emptied reference schema
    ///
    /// Schema-qualified statements are refused before anything is touched.
    async fn deploy_model_to_reference(&self, statements: &[String]) -> Result<()> {
        ensure_unqualified(statements)?;
        let reference = self.schemas().reference.clone();
        tracing::info!(reference = %reference, statements = statements.len(), "Deploying model to reference schema");

        self.recreate_schema(&reference).await?;
        self.execute_in_schema(&reference, statements).await
    }
}
