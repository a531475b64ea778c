//! Delta deployment orchestration
//!
//! A deploy run goes through these stages in order, each awaited before the
//! next one starts:
//!
//! 1. synchronize the clone schema with the default schema
//! 2. drop the model's views from the clone and diff default against it,
//!    giving the drop-views changelog
//! 3. deploy the compiled model into the reference schema
//! 4. diff the clone against the reference schema, giving the structural
//!    changelog
//! 5. merge and post-process both changelogs
//! 6. apply the result to the default schema, or render it as SQL
//!
//! The default schema is only written in step 6. Every intermediate
//! changelog file is removed when its stage ends, whether it failed or not,
//! and the clone and reference schemas are dropped when the run ends.

use clap::ValueEnum;
use std::path::PathBuf;

use crate::backend::{DeployBackend, PostgresBackend};
use crate::changelog::{process, ChangeLog, ProcessingPolicy, ScratchDir, UndeployList};
use crate::config::Config;
use crate::engine::{DiffEngine, EngineCommand, EngineOutput, LiquibaseEngine};
use crate::error::Result;
use crate::schema::compiler::{self, ModelCompiler};
use crate::schema::ordering::order_statements;
use crate::schema::statement::{classify_all, ensure_unqualified, DdlStatement};

/// How seed data would be loaded after a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LoadMode {
    Full,
    Delta,
}

/// Options of one deploy run
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub auto_undeploy: bool,
    pub load_via: Option<LoadMode>,
    pub dry_run: bool,
}

/// Result of the terminal deploy step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The changelog was applied to the default schema
    Applied { change_sets: usize },
    /// Dry run: the SQL the changelog would execute
    DryRun { sql: String },
}

/// Files and paths an orchestrator works with
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: PathBuf,
    pub undeploy_file: Option<PathBuf>,
    pub scratch: ScratchDir,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            model: config.model.path.clone(),
            undeploy_file: config.deploy.undeploy_file.clone(),
            scratch: ScratchDir::new(&config.deploy.tmp_dir, config.deploy.tmp_prefix.clone()),
        }
    }
}

/// Runs deploy, diff and drop workflows against one service's schemas
pub struct Orchestrator {
    backend: Box<dyn DeployBackend>,
    engine: Box<dyn DiffEngine>,
    compiler: Box<dyn ModelCompiler>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        backend: Box<dyn DeployBackend>,
        engine: Box<dyn DiffEngine>,
        compiler: Box<dyn ModelCompiler>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            backend,
            engine,
            compiler,
            settings,
        }
    }

    /// Connect the Postgres backend and build the configured engine and compiler
    pub async fn from_config(config: &Config) -> Result<Self> {
        let backend = PostgresBackend::connect(config).await?;
        let engine = LiquibaseEngine::from_config(&config.engine);
        let compiler = compiler::from_config(&config.model)?;

        Ok(Self::new(
            Box::new(backend),
            Box::new(engine),
            compiler,
            OrchestratorSettings::from(config),
        ))
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Compile the model and order its statements for deployment
    pub async fn compile_model(&self) -> Result<Vec<String>> {
        let statements = self.compiler.compile(&self.settings.model).await?;
        tracing::debug!(model = %self.settings.model.display(), statements = statements.len(), "Compiled model");
        ensure_unqualified(&statements)?;
        Ok(order_statements(statements))
    }

    /// Compute the delta between the model and the default schema and deploy it
    pub async fn deploy(&self, options: DeployOptions) -> Result<DeployOutcome> {
        tracing::info!(
            auto_undeploy = options.auto_undeploy,
            dry_run = options.dry_run,
            "Starting delta deployment"
        );
        self.settings.scratch.sweep_stale()?;

        let statements = self.compile_model().await?;
        let policy = ProcessingPolicy {
            auto_undeploy: options.auto_undeploy,
            undeploy: UndeployList::load_optional(self.settings.undeploy_file.as_deref())?,
        };

        let outcome = self.deploy_delta(&statements, &policy, options.dry_run).await;
        self.backend.drop_scratch_schemas().await;
        let outcome = outcome?;

        if let (DeployOutcome::Applied { .. }, Some(mode)) = (&outcome, options.load_via) {
            self.load(mode).await?;
        }
        Ok(outcome)
    }

    async fn deploy_delta(
        &self,
        statements: &[String],
        policy: &ProcessingPolicy,
        dry_run: bool,
    ) -> Result<DeployOutcome> {
        let entities = classify_all(statements);

        self.backend
            .synchronize_clone(self.engine.as_ref(), &self.settings.scratch)
            .await?;
        let drop_views = self.strip_views(&entities).await?;
        self.backend.deploy_model_to_reference(statements).await?;
        let diff = self.diff_against_reference().await?;

        let changelog = process(drop_views, diff, policy);
        self.execute(&changelog, dry_run).await
    }

    /// Drop the given views from the clone, returning the changelog that drops them from default
    pub async fn strip_views(&self, entities: &[DdlStatement]) -> Result<ChangeLog> {
        let schemas = self.backend.schemas().clone();
        self.backend.drop_views_from_clone(entities).await?;

        let fragment = self.settings.scratch.allocate("drop-views")?;
        let options = self
            .backend
            .options_for(EngineCommand::DiffChangeLog)
            .with_target(&schemas.default)
            .with_reference(&schemas.clone)
            .with_change_log(fragment.path());
        self.engine.run(EngineCommand::DiffChangeLog, &options).await?;

        let changelog = fragment.consume()?;
        tracing::info!(change_sets = changelog.len(), "Computed drop-views changelog");
        Ok(changelog)
    }

    /// Diff the clone (views stripped) against the reference schema
    pub async fn diff_against_reference(&self) -> Result<ChangeLog> {
        let schemas = self.backend.schemas().clone();

        let fragment = self.settings.scratch.allocate("diff")?;
        let options = self
            .backend
            .options_for(EngineCommand::DiffChangeLog)
            .with_target(&schemas.clone)
            .with_reference(&schemas.reference)
            .with_change_log(fragment.path());
        self.engine.run(EngineCommand::DiffChangeLog, &options).await?;

        let changelog = fragment.consume()?;
        tracing::info!(change_sets = changelog.len(), "Computed structural changelog");
        Ok(changelog)
    }

    /// Apply `changelog` to the default schema, or only render its SQL
    pub async fn execute(&self, changelog: &ChangeLog, dry_run: bool) -> Result<DeployOutcome> {
        for change_set in changelog {
            tracing::debug!(
                id = change_set.id(),
                kind = %change_set.kind().map(|kind| kind.to_string()).unwrap_or_default(),
                checksum = %change_set.checksum(),
                "Deploying changeset"
            );
        }

        let file = self.settings.scratch.persist("deploy", changelog)?;
        let command = if dry_run {
            EngineCommand::UpdateSql
        } else {
            EngineCommand::Update
        };
        let options = self.backend.options_for(command).with_change_log(file.path());
        let output = self.engine.run(command, &options).await?;

        if dry_run {
            Ok(DeployOutcome::DryRun {
                sql: output.into_text(),
            })
        } else {
            tracing::info!(change_sets = changelog.len(), "Deployment successful");
            Ok(DeployOutcome::Applied {
                change_sets: changelog.len(),
            })
        }
    }

    /// Report the differences between the default schema and the model
    ///
    /// With an output file the engine writes the report there and `None` is
    /// returned; otherwise the report text is returned.
    pub async fn diff(&self, output_file: Option<PathBuf>) -> Result<Option<String>> {
        self.settings.scratch.sweep_stale()?;

        let statements = self.compile_model().await?;
        let report = self.report_against_reference(&statements, output_file.clone()).await;
        self.backend.drop_scratch_schemas().await;
        let report = report?;

        Ok(match output_file {
            Some(path) => {
                tracing::info!(path = %path.display(), "Wrote diff");
                None
            }
            None => Some(report.into_text()),
        })
    }

    async fn report_against_reference(&self, statements: &[String], output_file: Option<PathBuf>) -> Result<EngineOutput> {
        self.backend.deploy_model_to_reference(statements).await?;

        let baseline = self.settings.scratch.persist("baseline", &ChangeLog::default())?;
        let options = self
            .backend
            .options_for(EngineCommand::Update)
            .with_change_log(baseline.path());
        self.engine.run(EngineCommand::Update, &options).await?;
        drop(baseline);

        let options = self.backend.options_for(EngineCommand::Diff).with_output(output_file);
        self.engine.run(EngineCommand::Diff, &options).await
    }

    /// Drop the service's objects from the default schema
    ///
    /// `drop_all` hands over to the engine, which removes everything in the
    /// schema. Otherwise only the tables and views of the model are dropped.
    pub async fn drop(&self, drop_all: bool) -> Result<()> {
        let default = self.backend.schemas().default.clone();
        if drop_all {
            tracing::info!(schema = %default, "Dropping all objects");
            let options = self.backend.options_for(EngineCommand::DropAll);
            self.engine.run(EngineCommand::DropAll, &options).await?;
            return Ok(());
        }

        self.drop_model_entities(&default, false).await
    }

    /// Drop the model's views, and its tables unless `views_only`, from `schema` in one transaction
    pub async fn drop_model_entities(&self, schema: &str, views_only: bool) -> Result<()> {
        let statements = self.compile_model().await?;
        let entities: Vec<DdlStatement> = classify_all(&statements)
            .into_iter()
            .filter(|ddl| !views_only || ddl.is_view())
            .collect();

        tracing::info!(schema, entities = entities.len(), views_only, "Dropping model entities");
        if entities.is_empty() {
            return Ok(());
        }
        self.backend.drop_entities(schema, &entities).await
    }

    /// Load seed data; not implemented
    pub async fn load(&self, via: LoadMode) -> Result<()> {
        tracing::warn!(via = ?via, "Loading data is not implemented, skipping");
        Ok(())
    }
}
