//! Operations graph produced by diffing two entry trees
//!
//! Nodes are the operations to replay, edges record `parent -> child`
//! reference relationships between them. The graph is built fresh for every
//! diff and is not mutated once returned.

pub mod builder;
pub mod classify;
pub mod identity;

pub use builder::GraphBuilder;
pub use classify::{BuildOptions, classify, has_changed, stable_stringify};
pub use identity::IdAllocator;

use log::warn;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::api::operations::{Operation, OperationKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationsGraph {
    /// Operations in discovery order, one per identity
    pub nodes: Vec<Operation>,
    /// Parent id -> ids of child nodes it references
    pub edges: BTreeMap<String, Vec<String>>,
    /// Resolved id of the top-level entry for single-entry builds.
    /// May be an edge source without being a node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

impl OperationsGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: &str) -> Option<&Operation> {
        self.nodes.iter().find(|op| op.id() == id)
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Nodes of one kind, in discovery order
    pub fn of_kind(&self, kind: OperationKind) -> Vec<&Operation> {
        self.nodes.iter().filter(|op| op.kind() == kind).collect()
    }

    pub fn creates(&self) -> Vec<&Operation> {
        self.of_kind(OperationKind::Create)
    }

    pub fn updates(&self) -> Vec<&Operation> {
        self.of_kind(OperationKind::Update)
    }

    pub fn dereferences(&self) -> Vec<&Operation> {
        self.of_kind(OperationKind::Dereference)
    }

    /// Layer the nodes of one kind so that every node comes after the
    /// children it references (Kahn's algorithm). Children of another kind
    /// are not constraints. Nodes caught in a reference cycle are returned
    /// together as the last level.
    pub fn dependency_levels(&self, kind: OperationKind) -> Vec<Vec<&Operation>> {
        let members: Vec<&Operation> = self.of_kind(kind);
        let member_ids: HashSet<&str> = members.iter().map(|op| op.id()).collect();

        // Outstanding dependencies per node, and who waits on each child
        let mut pending: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for op in &members {
            let deps: HashSet<&str> = self
                .children(op.id())
                .iter()
                .map(String::as_str)
                .filter(|child| member_ids.contains(child) && *child != op.id())
                .collect();
            pending.insert(op.id(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(op.id());
            }
        }

        let mut levels = Vec::new();
        let mut placed: HashSet<&str> = HashSet::new();
        loop {
            let ready: Vec<&Operation> = members
                .iter()
                .copied()
                .filter(|op| !placed.contains(op.id()) && pending.get(op.id()) == Some(&0))
                .collect();
            if ready.is_empty() {
                break;
            }
            for op in &ready {
                placed.insert(op.id());
                for dependent in dependents.get(op.id()).into_iter().flatten() {
                    if let Some(count) = pending.get_mut(dependent) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            levels.push(ready);
        }

        if placed.len() != members.len() {
            let remaining: Vec<&Operation> = members
                .iter()
                .copied()
                .filter(|op| !placed.contains(op.id()))
                .collect();
            warn!(
                "Circular references between {} {} operations, running them together: {}",
                remaining.len(),
                kind,
                remaining.iter().map(|op| op.id()).collect::<Vec<_>>().join(", ")
            );
            levels.push(remaining);
        }

        levels
    }
}
