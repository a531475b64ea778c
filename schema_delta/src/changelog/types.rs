//! In-memory changelog representation
//!
//! A changelog is an ordered list of changesets; each changeset holds one or
//! more changes of the form `{<kind>: {<payload>}}` as emitted by the diff
//! engine. Payloads are kept verbatim so documents round-trip losslessly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of a single schema operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    CreateTable,
    CreateView,
    DropTable,
    DropView,
    AddColumn,
    DropColumn,
    ModifyDataType,
    RenameColumn,
    RenameTable,
    RenameView,
    AddPrimaryKey,
    DropPrimaryKey,
    AddForeignKeyConstraint,
    DropForeignKeyConstraint,
    AddUniqueConstraint,
    DropUniqueConstraint,
    AddNotNullConstraint,
    DropNotNullConstraint,
    AddDefaultValue,
    DropDefaultValue,
    CreateIndex,
    DropIndex,
    CreateSequence,
    DropSequence,
    Insert,
    Sql,
    Other(String),
}

impl ChangeKind {
    /// Parse the key used in the changelog document
    pub fn from_key(key: &str) -> Self {
        match key {
            "createTable" => ChangeKind::CreateTable,
            "createView" => ChangeKind::CreateView,
            "dropTable" => ChangeKind::DropTable,
            "dropView" => ChangeKind::DropView,
            "addColumn" => ChangeKind::AddColumn,
            "dropColumn" => ChangeKind::DropColumn,
            "modifyDataType" => ChangeKind::ModifyDataType,
            "renameColumn" => ChangeKind::RenameColumn,
            "renameTable" => ChangeKind::RenameTable,
            "renameView" => ChangeKind::RenameView,
            "addPrimaryKey" => ChangeKind::AddPrimaryKey,
            "dropPrimaryKey" => ChangeKind::DropPrimaryKey,
            "addForeignKeyConstraint" => ChangeKind::AddForeignKeyConstraint,
            "dropForeignKeyConstraint" => ChangeKind::DropForeignKeyConstraint,
            "addUniqueConstraint" => ChangeKind::AddUniqueConstraint,
            "dropUniqueConstraint" => ChangeKind::DropUniqueConstraint,
            "addNotNullConstraint" => ChangeKind::AddNotNullConstraint,
            "dropNotNullConstraint" => ChangeKind::DropNotNullConstraint,
            "addDefaultValue" => ChangeKind::AddDefaultValue,
            "dropDefaultValue" => ChangeKind::DropDefaultValue,
            "createIndex" => ChangeKind::CreateIndex,
            "dropIndex" => ChangeKind::DropIndex,
            "createSequence" => ChangeKind::CreateSequence,
            "dropSequence" => ChangeKind::DropSequence,
            "insert" => ChangeKind::Insert,
            "sql" => ChangeKind::Sql,
            other => ChangeKind::Other(other.to_string()),
        }
    }

    /// The key used in the changelog document
    pub fn as_str(&self) -> &str {
        match self {
            ChangeKind::CreateTable => "createTable",
            ChangeKind::CreateView => "createView",
            ChangeKind::DropTable => "dropTable",
            ChangeKind::DropView => "dropView",
            ChangeKind::AddColumn => "addColumn",
            ChangeKind::DropColumn => "dropColumn",
            ChangeKind::ModifyDataType => "modifyDataType",
            ChangeKind::RenameColumn => "renameColumn",
            ChangeKind::RenameTable => "renameTable",
            ChangeKind::RenameView => "renameView",
            ChangeKind::AddPrimaryKey => "addPrimaryKey",
            ChangeKind::DropPrimaryKey => "dropPrimaryKey",
            ChangeKind::AddForeignKeyConstraint => "addForeignKeyConstraint",
            ChangeKind::DropForeignKeyConstraint => "dropForeignKeyConstraint",
            ChangeKind::AddUniqueConstraint => "addUniqueConstraint",
            ChangeKind::DropUniqueConstraint => "dropUniqueConstraint",
            ChangeKind::AddNotNullConstraint => "addNotNullConstraint",
            ChangeKind::DropNotNullConstraint => "dropNotNullConstraint",
            ChangeKind::AddDefaultValue => "addDefaultValue",
            ChangeKind::DropDefaultValue => "dropDefaultValue",
            ChangeKind::CreateIndex => "createIndex",
            ChangeKind::DropIndex => "dropIndex",
            ChangeKind::CreateSequence => "createSequence",
            ChangeKind::DropSequence => "dropSequence",
            ChangeKind::Insert => "insert",
            ChangeKind::Sql => "sql",
            ChangeKind::Other(key) => key,
        }
    }

    /// Whether the operation removes an object or part of one
    pub fn is_drop(&self) -> bool {
        self.as_str().starts_with("drop")
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The database object a change operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub schema: Option<String>,
    pub name: String,
}

impl Target {
    /// `schema.name` when a schema is present, otherwise the bare name
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

const TARGET_KEYS: [&str; 4] = ["viewName", "tableName", "baseTableName", "sequenceName"];

/// One schema operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Change {
    kind: ChangeKind,
    payload: Map<String, Value>,
}

impl Change {
    pub fn new(kind: ChangeKind, payload: Map<String, Value>) -> Self {
        Self { kind, payload }
    }

    pub fn kind(&self) -> &ChangeKind {
        &self.kind
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Object this change operates on, if the payload names one
    pub fn target(&self) -> Option<Target> {
        let name = TARGET_KEYS
            .iter()
            .find_map(|key| self.payload.get(*key).and_then(Value::as_str))?;

        Some(Target {
            schema: self
                .payload
                .get("schemaName")
                .and_then(Value::as_str)
                .map(str::to_string),
            name: name.to_string(),
        })
    }

    /// View body for `createView` changes
    pub fn select_query(&self) -> Option<&str> {
        match self.kind {
            ChangeKind::CreateView => self.payload.get("selectQuery").and_then(Value::as_str),
            _ => None,
        }
    }
}

impl TryFrom<Value> for Change {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        let Value::Object(object) = value else {
            return Err("change must be an object".to_string());
        };
        if object.len() != 1 {
            return Err(format!(
                "change must have exactly one operation key, found {}",
                object.len()
            ));
        }

        let (key, body) = object.into_iter().next().ok_or("empty change")?;
        match body {
            Value::Object(payload) => Ok(Change::new(ChangeKind::from_key(&key), payload)),
            Value::Null => Ok(Change::new(ChangeKind::from_key(&key), Map::new())),
            _ => Err(format!("payload of `{}` must be an object", key)),
        }
    }
}

impl From<Change> for Value {
    fn from(change: Change) -> Self {
        let mut object = Map::new();
        object.insert(change.kind.as_str().to_string(), Value::Object(change.payload));
        Value::Object(object)
    }
}

/// One atomic unit of a changelog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    id: String,
    author: String,
    changes: Vec<Change>,
    /// Attributes such as `runAlways` or `preConditions`, kept as found
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

impl ChangeSet {
    pub fn new(id: impl Into<String>, author: impl Into<String>, changes: Vec<Change>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            changes,
            attributes: Map::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Kind of the primary (first) change
    pub fn kind(&self) -> Option<&ChangeKind> {
        self.changes.first().map(Change::kind)
    }

    /// Target of the primary (first) change
    pub fn target(&self) -> Option<Target> {
        self.changes.first().and_then(Change::target)
    }

    pub fn is_drop(&self) -> bool {
        self.kind().map_or(false, ChangeKind::is_drop)
    }

    /// MD5 over the canonical JSON of the changes
    pub fn checksum(&self) -> String {
        let canonical = serde_json::to_string(&self.changes).unwrap_or_default();
        format!("{:x}", md5::compute(canonical.as_bytes()))
    }

    /// Drop every change matching `predicate`, returning how many were removed
    pub(crate) fn retain_changes(&mut self, predicate: impl Fn(&Change) -> bool) -> usize {
        let before = self.changes.len();
        self.changes.retain(|change| predicate(change));
        before - self.changes.len()
    }
}

/// An ordered list of changesets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    change_sets: Vec<ChangeSet>,
}

impl ChangeLog {
    pub fn new(change_sets: Vec<ChangeSet>) -> Self {
        Self { change_sets }
    }

    /// `a`'s changesets followed by `b`'s
    pub fn concat(a: ChangeLog, b: ChangeLog) -> ChangeLog {
        let mut change_sets = a.change_sets;
        change_sets.extend(b.change_sets);
        ChangeLog { change_sets }
    }

    pub fn change_sets(&self) -> &[ChangeSet] {
        &self.change_sets
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeSet> {
        self.change_sets.iter()
    }

    pub fn push(&mut self, change_set: ChangeSet) {
        self.change_sets.push(change_set);
    }

    pub fn len(&self) -> usize {
        self.change_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_sets.is_empty()
    }

    pub fn into_change_sets(self) -> Vec<ChangeSet> {
        self.change_sets
    }

    pub(crate) fn change_sets_mut(&mut self) -> &mut Vec<ChangeSet> {
        &mut self.change_sets
    }
}

impl<'a> IntoIterator for &'a ChangeLog {
    type Item = &'a ChangeSet;
    type IntoIter = std::slice::Iter<'a, ChangeSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.change_sets.iter()
    }
}
