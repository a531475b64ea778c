//! In-memory stand-ins for the database and the diff engine

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use schema_delta::changelog::{Change, ChangeKind, ChangeLog, ChangeSet, ScratchDir};
use schema_delta::engine::{DiffEngine, EngineCommand, EngineOptions, EngineOutput};
use schema_delta::schema::statement::{classify, DdlStatement, StatementKind};
use schema_delta::{DeployBackend, Error, ModelCompiler, Orchestrator, OrchestratorSettings, Result, SchemaNames};

pub const DEFAULT: &str = "public";
pub const CLONE: &str = "_clone";
pub const REFERENCE: &str = "_ref";

/// Tables by name (definition) and views by name (select query)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeSchema {
    pub tables: BTreeMap<String, String>,
    pub views: BTreeMap<String, String>,
}

impl FakeSchema {
    pub fn with_table(mut self, name: &str) -> Self {
        self.tables.insert(name.to_string(), format!("CREATE TABLE {}", name));
        self
    }

    pub fn with_view(mut self, name: &str, query: &str) -> Self {
        self.views.insert(name.to_string(), query.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.views.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct World {
    pub schemas: HashMap<String, FakeSchema>,
    /// Engine commands with the schema they targeted
    pub calls: Vec<(EngineCommand, String)>,
}

impl World {
    pub fn schema(&self, name: &str) -> FakeSchema {
        self.schemas.get(name).cloned().unwrap_or_default()
    }
}

pub type SharedWorld = Arc<Mutex<World>>;

pub fn world_with_default(schema: FakeSchema) -> SharedWorld {
    let mut world = World::default();
    world.schemas.insert(DEFAULT.to_string(), schema);
    Arc::new(Mutex::new(world))
}

fn view_query(statement: &str) -> String {
    let upper = statement.to_uppercase();
    match upper.find(" AS ") {
        Some(index) => statement[index + 4..].trim().to_string(),
        None => String::new(),
    }
}

pub struct FakeBackend {
    pub world: SharedWorld,
    pub schemas: SchemaNames,
    pub fail_drops: bool,
}

impl FakeBackend {
    pub fn new(world: SharedWorld) -> Self {
        Self {
            world,
            schemas: SchemaNames {
                default: DEFAULT.to_string(),
                clone: CLONE.to_string(),
                reference: REFERENCE.to_string(),
            },
            fail_drops: false,
        }
    }
}

#[async_trait]
impl DeployBackend for FakeBackend {
    fn schemas(&self) -> &SchemaNames {
        &self.schemas
    }

    fn options_for(&self, command: EngineCommand) -> EngineOptions {
        let mut options = EngineOptions {
            url: "jdbc:fake://db".to_string(),
            default_schema_name: self.schemas.default.clone(),
            ..EngineOptions::default()
        };
        if command.needs_reference() {
            options.reference_default_schema_name = Some(self.schemas.reference.clone());
        }
        options
    }

    async fn recreate_schema(&self, schema: &str) -> Result<()> {
        let mut world = self.world.lock().unwrap();
        world.schemas.insert(schema.to_string(), FakeSchema::default());
        Ok(())
    }

    async fn execute_in_schema(&self, schema: &str, statements: &[String]) -> Result<()> {
        let mut world = self.world.lock().unwrap();
        let mut target = world.schema(schema);
        for statement in statements {
            let Ok(ddl) = classify(statement) else { continue };
            match ddl.kind {
                StatementKind::Table => {
                    target.tables.insert(ddl.name, statement.clone());
                }
                StatementKind::View => {
                    target.views.insert(ddl.name, view_query(statement));
                }
            }
        }
        world.schemas.insert(schema.to_string(), target);
        Ok(())
    }

    async fn drop_schema(&self, schema: &str) -> Result<()> {
        self.world.lock().unwrap().schemas.remove(schema);
        Ok(())
    }

    async fn drop_entities(&self, schema: &str, entities: &[DdlStatement]) -> Result<()> {
        if self.fail_drops {
            return Err(Error::TransactionFailure("simulated commit failure".to_string()));
        }

        let mut world = self.world.lock().unwrap();
        let mut target = world.schema(schema);
        for ddl in entities {
            match ddl.kind {
                StatementKind::Table => target.tables.remove(&ddl.name),
                StatementKind::View => target.views.remove(&ddl.name),
            };
        }
        world.schemas.insert(schema.to_string(), target);
        Ok(())
    }
}

type FailWhen = Box<dyn Fn(EngineCommand, &EngineOptions) -> bool + Send + Sync>;

/// Diffs and applies changelogs against the fake schemas
///
/// Generated changelogs list view creations first and drops last, so the
/// processor has to reorder them.
pub struct FakeEngine {
    pub world: SharedWorld,
    pub fail_when: Option<FailWhen>,
    /// diffChangeLog writes a file that is not a changelog
    pub malformed_diff: bool,
    ids: AtomicUsize,
}

impl FakeEngine {
    pub fn new(world: SharedWorld) -> Self {
        Self {
            world,
            fail_when: None,
            malformed_diff: false,
            ids: AtomicUsize::new(0),
        }
    }

    pub fn failing_when(mut self, predicate: impl Fn(EngineCommand, &EngineOptions) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    fn change_set(&self, change: serde_json::Value) -> ChangeSet {
        let id = self.ids.fetch_add(1, Ordering::SeqCst);
        ChangeSet::new(format!("fake-{}", id), "fake-engine", vec![Change::try_from(change).unwrap()])
    }

    fn diff_change_log(&self, target: &FakeSchema, reference: &FakeSchema) -> ChangeLog {
        let mut creates = Vec::new();
        let mut drops = Vec::new();

        for (name, query) in &reference.views {
            if target.views.get(name) != Some(query) {
                creates.push(self.change_set(json!({"createView": {"viewName": name, "selectQuery": query}})));
            }
        }
        for name in reference.tables.keys() {
            if !target.tables.contains_key(name) {
                creates.push(self.change_set(json!({"createTable": {"tableName": name, "columns": [{"column": {"name": "id", "type": "INT"}}]}})));
            }
        }
        for (name, query) in &target.views {
            if reference.views.get(name) != Some(query) {
                drops.push(self.change_set(json!({"dropView": {"viewName": name}})));
            }
        }
        for name in target.tables.keys() {
            if !reference.tables.contains_key(name) {
                drops.push(self.change_set(json!({"dropTable": {"tableName": name}})));
            }
        }

        creates.extend(drops);
        ChangeLog::new(creates)
    }

    fn change_log(options: &EngineOptions) -> Result<ChangeLog> {
        let path = options
            .change_log_file
            .as_ref()
            .ok_or_else(|| Error::engine("fake", "no changelog file"))?;
        ChangeLog::load(path)
    }

    fn apply(schema: &mut FakeSchema, changelog: &ChangeLog) {
        for change in changelog.iter().flat_map(|change_set| change_set.changes()) {
            let name = change.target().map(|target| target.name).unwrap_or_default();
            match change.kind() {
                ChangeKind::CreateTable => {
                    schema.tables.insert(name.clone(), format!("CREATE TABLE {}", name));
                }
                ChangeKind::CreateView => {
                    schema.views.insert(name, change.select_query().unwrap_or_default().to_string());
                }
                ChangeKind::DropTable => {
                    schema.tables.remove(&name);
                }
                ChangeKind::DropView => {
                    schema.views.remove(&name);
                }
                _ => {}
            }
        }
    }

    fn render_sql(changelog: &ChangeLog) -> String {
        changelog
            .iter()
            .flat_map(|change_set| change_set.changes())
            .map(|change| {
                let name = change.target().map(|target| target.name).unwrap_or_default();
                match change.kind() {
                    ChangeKind::CreateTable => format!("CREATE TABLE {} (id INT);", name),
                    ChangeKind::CreateView => {
                        format!("CREATE VIEW {} AS {};", name, change.select_query().unwrap_or_default())
                    }
                    ChangeKind::DropTable => format!("DROP TABLE {};", name),
                    ChangeKind::DropView => format!("DROP VIEW {};", name),
                    other => format!("-- {} {};", other, name),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl DiffEngine for FakeEngine {
    async fn run(&self, command: EngineCommand, options: &EngineOptions) -> Result<EngineOutput> {
        self.world
            .lock()
            .unwrap()
            .calls
            .push((command, options.default_schema_name.clone()));

        if let Some(fail_when) = &self.fail_when {
            if fail_when(command, options) {
                return Err(Error::engine(command, "simulated engine failure"));
            }
        }

        match command {
            EngineCommand::Update => {
                let changelog = Self::change_log(options)?;
                let mut world = self.world.lock().unwrap();
                let mut target = world.schema(&options.default_schema_name);
                Self::apply(&mut target, &changelog);
                world.schemas.insert(options.default_schema_name.clone(), target);
                Ok(EngineOutput::Done)
            }
            EngineCommand::UpdateSql => {
                let changelog = Self::change_log(options)?;
                Ok(EngineOutput::Text(Self::render_sql(&changelog)))
            }
            EngineCommand::DiffChangeLog => {
                let (target, reference) = {
                    let world = self.world.lock().unwrap();
                    let reference = options.reference_default_schema_name.clone().unwrap_or_default();
                    (world.schema(&options.default_schema_name), world.schema(&reference))
                };
                let path = options
                    .change_log_file
                    .as_ref()
                    .ok_or_else(|| Error::engine(command, "no changelog file"))?;
                if self.malformed_diff {
                    std::fs::write(path, "Unexpected error running Liquibase\n")?;
                    return Ok(EngineOutput::Done);
                }
                self.diff_change_log(&target, &reference).save(path)?;
                Ok(EngineOutput::Done)
            }
            EngineCommand::Diff => {
                let world = self.world.lock().unwrap();
                let reference = options.reference_default_schema_name.clone().unwrap_or_default();
                let target = world.schema(&options.default_schema_name);
                let reference = world.schema(&reference);
                let missing: Vec<&String> = reference
                    .tables
                    .keys()
                    .chain(reference.views.keys())
                    .filter(|name| !target.tables.contains_key(*name) && !target.views.contains_key(*name))
                    .collect();
                let report = format!("Missing objects: {:?}", missing);

                match &options.output_file {
                    Some(path) => {
                        std::fs::write(path, report)?;
                        Ok(EngineOutput::Done)
                    }
                    None => Ok(EngineOutput::Text(report)),
                }
            }
            EngineCommand::DropAll => {
                let mut world = self.world.lock().unwrap();
                world
                    .schemas
                    .insert(options.default_schema_name.clone(), FakeSchema::default());
                Ok(EngineOutput::Done)
            }
        }
    }
}

/// Compiler returning fixed statements
pub struct StaticCompiler(pub Vec<String>);

#[async_trait]
impl ModelCompiler for StaticCompiler {
    async fn compile(&self, _model: &Path) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

pub fn model(statements: &[&str]) -> StaticCompiler {
    StaticCompiler(statements.iter().map(|s| s.to_string()).collect())
}

pub fn settings(scratch_dir: &Path, undeploy_file: Option<PathBuf>) -> OrchestratorSettings {
    OrchestratorSettings {
        model: PathBuf::from("db/model.sql"),
        undeploy_file,
        scratch: ScratchDir::new(scratch_dir, "sd_test"),
    }
}

pub fn orchestrator(
    backend: FakeBackend,
    engine: FakeEngine,
    compiler: StaticCompiler,
    settings: OrchestratorSettings,
) -> Orchestrator {
    Orchestrator::new(Box::new(backend), Box::new(engine), Box::new(compiler), settings)
}

pub fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|entries| entries.count() == 0).unwrap_or(true)
}
