//! Changelog post-processing
//!
//! Turns the drop-views fragment and the structural diff into the single
//! changelog that gets deployed. Drop policy is decided here and nowhere else.

use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::changelog::types::{ChangeKind, ChangeLog, ChangeSet, Target};
use crate::error::{Error, Result};
use crate::schema::ordering::{stable_topological_order, DependencyNode};
use crate::schema::statement::relation_names;

/// Entities that must never be dropped automatically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndeployList {
    entities: IndexSet<String>,
}

impl UndeployList {
    pub fn new<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entities: entities
                .into_iter()
                .map(|entity| entity.as_ref().trim().to_lowercase())
                .filter(|entity| !entity.is_empty())
                .collect(),
        }
    }

    /// Read the list from a JSON array (`.json`) or a one-name-per-line file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let list = if path.extension().map_or(false, |ext| ext == "json") {
            let names: Vec<String> = serde_json::from_str(&contents).map_err(|e| {
                Error::ConfigError(format!("Invalid undeploy file {}: {}", path.display(), e))
            })?;
            Self::new(names)
        } else {
            Self::new(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.starts_with('#')),
            )
        };

        tracing::debug!(path = %path.display(), entities = list.len(), "Loaded undeploy list");
        Ok(list)
    }

    /// Load `path` when given, otherwise an empty list
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether `target` names a listed entity
    ///
    /// Matches the bare name, the schema-qualified name and the name with
    /// dots turned into underscores, ignoring ASCII case.
    pub fn contains(&self, target: &Target) -> bool {
        let name = target.name.to_lowercase();
        let qualified = target.qualified().to_lowercase();

        self.entities.iter().any(|entity| {
            *entity == name || *entity == qualified || entity.replace('.', "_") == name
        })
    }
}

/// Drop policy for one run
#[derive(Debug, Clone, Default)]
pub struct ProcessingPolicy {
    pub auto_undeploy: bool,
    pub undeploy: UndeployList,
}

impl ChangeLog {
    /// Remove every `dropTable` change; changesets left empty are removed too
    pub fn remove_drop_table_statements(&mut self) -> usize {
        let mut removed = 0;
        self.change_sets_mut().retain_mut(|change_set| {
            removed += change_set.retain_changes(|change| change.kind() != &ChangeKind::DropTable);
            !change_set.changes().is_empty()
        });
        removed
    }

    /// Remove every changeset whose target is on the undeploy list
    pub fn remove_entities_in(&mut self, undeploy: &UndeployList) -> usize {
        if undeploy.is_empty() {
            return 0;
        }

        let before = self.len();
        self.change_sets_mut().retain(|change_set| match change_set.target() {
            Some(target) if undeploy.contains(&target) => {
                tracing::debug!(target = %target, id = change_set.id(), "Excluding undeployed entity");
                false
            }
            _ => true,
        });
        before - self.len()
    }

    /// Drops first, then creates and alters, each in dependency order
    ///
    /// A created view follows everything it selects from; a dropped view is
    /// dropped before the views it selects from. View dependencies are read
    /// from the `createView` bodies present in this changelog.
    pub fn reorder(&mut self) {
        let view_dependencies = self.view_dependencies();
        let change_sets = std::mem::take(self.change_sets_mut());
        let (drops, others): (Vec<ChangeSet>, Vec<ChangeSet>) =
            change_sets.into_iter().partition(ChangeSet::is_drop);

        let drops = sort_partition(drops, |change_set| {
            let name = target_key(change_set)?;
            let requires = view_dependencies
                .iter()
                .filter(|(view, deps)| **view != name && deps.contains(&name))
                .map(|(view, _)| view.clone())
                .collect();
            Some((name, requires))
        });
        let others = sort_partition(others, |change_set| {
            let name = target_key(change_set)?;
            let requires = view_dependencies.get(&name).cloned().unwrap_or_default();
            Some((name, requires))
        });

        let merged = self.change_sets_mut();
        merged.extend(drops);
        merged.extend(others);
    }

    /// Referenced names per created view, keyed by lower-cased view name
    fn view_dependencies(&self) -> HashMap<String, HashSet<String>> {
        self.iter()
            .flat_map(|change_set| change_set.changes())
            .filter_map(|change| {
                let query = change.select_query()?;
                let view = change.target()?.name.to_lowercase();
                let mut names = relation_names(query);
                names.remove(&view);
                Some((view, names))
            })
            .collect()
    }
}

fn target_key(change_set: &ChangeSet) -> Option<String> {
    change_set.target().map(|target| target.name.to_lowercase())
}

fn sort_partition<F>(partition: Vec<ChangeSet>, describe: F) -> Vec<ChangeSet>
where
    F: Fn(&ChangeSet) -> Option<(String, HashSet<String>)>,
{
    let nodes: Vec<DependencyNode> = partition
        .iter()
        .map(|change_set| match describe(change_set) {
            Some((name, requires)) => DependencyNode {
                provides: vec![name],
                requires,
            },
            None => DependencyNode::default(),
        })
        .collect();

    let mut slots: Vec<Option<ChangeSet>> = partition.into_iter().map(Some).collect();
    stable_topological_order(&nodes)
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

/// Merge the drop-views fragment with the structural diff and apply drop policy
pub fn process(drop_views: ChangeLog, diff: ChangeLog, policy: &ProcessingPolicy) -> ChangeLog {
    let mut merged = ChangeLog::concat(drop_views, diff);
    let total = merged.len();

    let suppressed = if policy.auto_undeploy {
        0
    } else {
        merged.remove_drop_table_statements()
    };
    let excluded = merged.remove_entities_in(&policy.undeploy);
    merged.reorder();

    tracing::info!(
        total,
        suppressed_table_drops = suppressed,
        excluded_entities = excluded,
        remaining = merged.len(),
        "Processed changelog"
    );
    merged
}
