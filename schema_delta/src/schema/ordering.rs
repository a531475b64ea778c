//! Cascading-view ordering
//!
//! Stable topological sorting of items that provide and require object names.
//! Among the items whose dependencies are satisfied, the one with the lowest
//! original index always goes next, so independent items keep their relative
//! order. Items caught in a cycle are emitted in original order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::schema::statement::{classify, relation_names};

/// One item to order
#[derive(Debug, Clone, Default)]
pub struct DependencyNode {
    /// Lower-cased names this item creates or removes
    pub provides: Vec<String>,
    /// Lower-cased names that must be handled before this item
    pub requires: HashSet<String>,
}

/// Indices of `nodes` in dependency order
pub fn stable_topological_order(nodes: &[DependencyNode]) -> Vec<usize> {
    let mut providers: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        for name in &node.provides {
            providers.entry(name.as_str()).or_default().push(index);
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut pending: Vec<usize> = vec![0; nodes.len()];
    for (index, node) in nodes.iter().enumerate() {
        let upstream: HashSet<usize> = node
            .requires
            .iter()
            .filter_map(|name| providers.get(name.as_str()))
            .flatten()
            .copied()
            .filter(|&provider| provider != index)
            .collect();

        pending[index] = upstream.len();
        for provider in upstream {
            dependents[provider].push(index);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..nodes.len())
        .filter(|&index| pending[index] == 0)
        .map(Reverse)
        .collect();
    let mut emitted = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    while order.len() < nodes.len() {
        let next = match ready.pop() {
            Some(Reverse(index)) => index,
            None => {
                // Cycle: release its earliest member, not something waiting on it.
                let blocked = || (0..nodes.len()).filter(|&index| !emitted[index]);
                match blocked()
                    .find(|&index| lies_on_cycle(index, &dependents, &emitted))
                    .or_else(|| blocked().next())
                {
                    Some(index) => {
                        tracing::warn!(index, "Dependency cycle while ordering, keeping original position");
                        index
                    }
                    None => break,
                }
            }
        };
        if emitted[next] {
            continue;
        }

        emitted[next] = true;
        order.push(next);
        for &dependent in &dependents[next] {
            pending[dependent] = pending[dependent].saturating_sub(1);
            if pending[dependent] == 0 && !emitted[dependent] {
                ready.push(Reverse(dependent));
            }
        }
    }

    order
}

/// Whether `start` can reach itself through unemitted dependents
fn lies_on_cycle(start: usize, dependents: &[Vec<usize>], emitted: &[bool]) -> bool {
    let mut seen = vec![false; dependents.len()];
    let mut stack = dependents[start].clone();

    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if emitted[node] || seen[node] {
            continue;
        }
        seen[node] = true;
        stack.extend(dependents[node].iter().copied());
    }
    false
}

/// Order compiled model statements so no view precedes an object it selects from
pub fn order_statements(statements: Vec<String>) -> Vec<String> {
    let nodes: Vec<DependencyNode> = statements
        .iter()
        .map(|statement| match classify(statement) {
            Ok(ddl) => {
                let own = ddl.name.to_lowercase();
                let mut provides = vec![own.clone()];
                if let Some(schema) = &ddl.schema {
                    provides.push(format!("{}.{}", schema.to_lowercase(), own));
                }
                let requires = if ddl.is_view() {
                    let mut names = relation_names(statement);
                    for name in &provides {
                        names.remove(name);
                    }
                    names
                } else {
                    HashSet::new()
                };
                DependencyNode { provides, requires }
            }
            Err(_) => DependencyNode::default(),
        })
        .collect();

    let mut slots: Vec<Option<String>> = statements.into_iter().map(Some).collect();
    stable_topological_order(&nodes)
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(provides: &[&str], requires: &[&str]) -> DependencyNode {
        DependencyNode {
            provides: provides.iter().map(|s| s.to_string()).collect(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_independent_items_keep_order() {
        let nodes = vec![node(&["a"], &[]), node(&["b"], &[]), node(&["c"], &[])];
        assert_eq!(stable_topological_order(&nodes), vec![0, 1, 2]);
    }

    #[test]
    fn test_dependency_moves_dependent_after_provider() {
        let nodes = vec![node(&["v2"], &["v1"]), node(&["t"], &[]), node(&["v1"], &["t"])];
        assert_eq!(stable_topological_order(&nodes), vec![1, 2, 0]);
    }

    #[test]
    fn test_interleaved_chains_prefer_lowest_index() {
        // a2 -> a1, b2 -> b1
        let nodes = vec![
            node(&["a2"], &["a1"]),
            node(&["b2"], &["b1"]),
            node(&["a1"], &[]),
            node(&["b1"], &[]),
        ];
        assert_eq!(stable_topological_order(&nodes), vec![2, 0, 3, 1]);
    }

    #[test]
    fn test_cycle_falls_back_to_original_order() {
        let nodes = vec![node(&["x"], &["y"]), node(&["y"], &["x"]), node(&["z"], &[])];
        let order = stable_topological_order(&nodes);
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], 2);
        assert_eq!(order[1..], [0, 1]);
    }

    #[test]
    fn test_cycle_does_not_release_waiting_dependents() {
        // v waits on x, and x and y form a cycle
        let nodes = vec![node(&["v"], &["x"]), node(&["x"], &["y"]), node(&["y"], &["x"])];
        assert_eq!(stable_topological_order(&nodes), vec![1, 0, 2]);
    }

    #[test]
    fn test_order_statements_cascades_views() {
        let statements = vec![
            "CREATE VIEW top_books AS SELECT * FROM books_view".to_string(),
            "CREATE VIEW books_view AS SELECT * FROM books".to_string(),
            "CREATE TABLE books (id INTEGER)".to_string(),
            "CREATE INDEX ix_books ON books (id)".to_string(),
        ];

        assert_eq!(
            order_statements(statements),
            vec![
                "CREATE TABLE books (id INTEGER)".to_string(),
                "CREATE VIEW books_view AS SELECT * FROM books".to_string(),
                "CREATE VIEW top_books AS SELECT * FROM books_view".to_string(),
                "CREATE INDEX ix_books ON books (id)".to_string(),
            ]
        );
    }
}
