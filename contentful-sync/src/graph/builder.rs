//! Lock-step walk of the initial and updated entry trees
//!
//! The walk classifies every distinct identity exactly once. Shared children
//! and reference cycles stop expanding as soon as their identity has been
//! visited, so the build always terminates.

use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::api::models::{Entry, LinkType, Reference};
use crate::api::operations::Operation;
use crate::api::parse::EntryParser;
use crate::error::GraphError;
use crate::graph::OperationsGraph;
use crate::graph::classify::{BuildOptions, classify};
use crate::graph::identity::IdAllocator;

/// Builds an [`OperationsGraph`] from an initial and an updated tree
#[derive(Debug)]
pub struct GraphBuilder {
    options: BuildOptions,
    ids: IdAllocator,
}

impl GraphBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            ids: IdAllocator::new(),
        }
    }

    /// Replace the UUID generator, e.g. with [`crate::graph::identity::sequential`]
    pub fn with_id_generator(mut self, generate: impl FnMut() -> String + Send + 'static) -> Self {
        self.ids = IdAllocator::with_generator(generate);
        self
    }

    /// Diff a single entry. When both sides are given they are paired
    /// regardless of the updated side's id: the root keeps the initial identity.
    pub fn build_entry(
        mut self,
        initial: Option<&Entry>,
        updated: Option<&Entry>,
    ) -> Result<OperationsGraph, GraphError> {
        let initial = initial.map(|entry| self.retype(entry)).transpose()?;
        let updated = updated.map(|entry| self.retype(entry)).transpose()?;
        let initial = initial.as_ref();

        let initial_index = index_initial(initial.into_iter())?;
        reserve_ids(&mut self.ids, &initial_index, updated.iter());
        let resolved = match updated.as_ref() {
            Some(updated) => {
                let root_id = initial.and_then(Entry::id);
                Some(resolve_root(updated, root_id, &initial_index, &mut self.ids)?)
            }
            None => None,
        };

        let root = resolved
            .as_ref()
            .and_then(|e| e.id.clone())
            .or_else(|| initial.and_then(|e| e.id.clone()));

        let mut walk = Walk::new(&self.options, &mut self.ids, initial_index, resolved.iter());
        walk.root = root.clone();
        walk.visit_pair(initial, resolved.as_ref(), None)?;

        let graph = walk.finish(root);
        debug!(
            "Built operations graph: {} nodes, {} edge sources",
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }

    /// Diff two lists of entries, pairing them by identity
    pub fn build_entries(
        mut self,
        initial: &[Entry],
        updated: &[Entry],
    ) -> Result<OperationsGraph, GraphError> {
        let initial: Vec<Entry> = initial
            .iter()
            .map(|entry| self.retype(entry))
            .collect::<Result<_, _>>()?;
        let updated: Vec<Entry> = updated
            .iter()
            .map(|entry| self.retype(entry))
            .collect::<Result<_, _>>()?;

        let initial_index = index_initial(initial.iter())?;
        reserve_ids(&mut self.ids, &initial_index, updated.iter());
        let resolved: Vec<Entry> = updated
            .iter()
            .map(|entry| resolve(entry, &initial_index, &mut self.ids))
            .collect::<Result<_, _>>()?;

        let initial_refs: Vec<Reference<'_>> = initial.iter().map(Reference::Entry).collect();
        let updated_refs: Vec<Reference<'_>> = resolved.iter().map(Reference::Entry).collect();

        let mut walk = Walk::new(&self.options, &mut self.ids, initial_index, resolved.iter());
        walk.visit_references(&initial_refs, &updated_refs, None)?;

        let graph = walk.finish(None);
        debug!(
            "Built operations graph for {} entries: {} nodes",
            updated.len().max(initial.len()),
            graph.nodes.len()
        );
        Ok(graph)
    }

    /// Apply the content type registry's reference declarations
    fn retype(&self, entry: &Entry) -> Result<Entry, GraphError> {
        EntryParser::new()
            .with_content_types(&self.options.content_types)
            .retype(entry)
    }
}

/// Identities of the initial tree
#[derive(Debug, Default)]
struct InitialIndex<'a> {
    /// Resolved entries by id; first occurrence wins
    entries: HashMap<String, &'a Entry>,
    /// Every entry id, including ones only known through a link
    known: HashSet<String>,
}

fn index_initial<'a>(roots: impl Iterator<Item = &'a Entry>) -> Result<InitialIndex<'a>, GraphError> {
    let mut index = InitialIndex::default();
    let mut missing_id = false;
    for root in roots {
        root.walk(&mut |entry: &'a Entry| {
            let Some(id) = entry.id() else {
                missing_id = true;
                return;
            };
            index.known.insert(id.to_string());
            index.entries.entry(id.to_string()).or_insert(entry);
            for reference in entry.references() {
                if let Reference::Link(link) = reference {
                    if link.link_type == LinkType::Entry {
                        index.known.insert(link.id.clone());
                    }
                }
            }
        });
    }
    if missing_id {
        return Err(GraphError::malformed(
            "initial tree contains an entry without an id",
        ));
    }
    Ok(index)
}

/// Keep generated ids clear of every id either tree already mentions
fn reserve_ids<'a>(
    ids: &mut IdAllocator,
    initial_index: &InitialIndex<'_>,
    updated_roots: impl Iterator<Item = &'a Entry>,
) {
    ids.reserve(initial_index.known.iter().cloned());
    for root in updated_roots {
        root.walk(&mut |entry| {
            ids.reserve(entry.id());
            ids.reserve(entry.references().iter().filter_map(Reference::id));
        });
    }
}

fn resolve_root(
    updated: &Entry,
    root_id: Option<&str>,
    initial_index: &InitialIndex<'_>,
    ids: &mut IdAllocator,
) -> Result<Entry, GraphError> {
    let id = match root_id {
        Some(root_id) => root_id.to_string(),
        None => resolve_id(updated, initial_index, ids),
    };
    resolve_with_id(updated, id, initial_index, ids)
}

/// Copy of `entry` where every identity unknown to the initial tree is
/// replaced by an allocated one
fn resolve(
    entry: &Entry,
    initial_index: &InitialIndex<'_>,
    ids: &mut IdAllocator,
) -> Result<Entry, GraphError> {
    let id = resolve_id(entry, initial_index, ids);
    resolve_with_id(entry, id, initial_index, ids)
}

fn resolve_id(entry: &Entry, initial_index: &InitialIndex<'_>, ids: &mut IdAllocator) -> String {
    match entry.id() {
        Some(id) if initial_index.known.contains(id) => id.to_string(),
        provisional => ids.allocate(provisional),
    }
}

fn resolve_with_id(
    entry: &Entry,
    id: String,
    initial_index: &InitialIndex<'_>,
    ids: &mut IdAllocator,
) -> Result<Entry, GraphError> {
    let mut fields = BTreeMap::new();
    for (name, value) in &entry.fields {
        let value = value.map_entries(&mut |nested| resolve(nested, initial_index, ids))?;
        fields.insert(name.clone(), value);
    }

    Ok(Entry {
        id: Some(id),
        content_type: entry.content_type.clone(),
        version: entry.version,
        fields,
    })
}

struct Walk<'o> {
    options: &'o BuildOptions,
    ids: &'o mut IdAllocator,
    initial_index: InitialIndex<'o>,
    /// Identities referenced anywhere in the updated tree (entries and links)
    updated_ids: HashSet<String>,
    visited: HashSet<String>,
    node_ids: HashSet<String>,
    nodes: Vec<Operation>,
    edges: BTreeMap<String, Vec<String>>,
    root: Option<String>,
}

impl<'o> Walk<'o> {
    fn new<'u>(
        options: &'o BuildOptions,
        ids: &'o mut IdAllocator,
        initial_index: InitialIndex<'o>,
        updated_roots: impl Iterator<Item = &'u Entry>,
    ) -> Self {
        let mut updated_ids = HashSet::new();
        for root in updated_roots {
            root.walk(&mut |entry| {
                if let Some(id) = entry.id() {
                    updated_ids.insert(id.to_string());
                }
                for reference in entry.references() {
                    if let Some(id) = reference.id() {
                        updated_ids.insert(id.to_string());
                    }
                }
            });
        }

        Self {
            options,
            ids,
            initial_index,
            updated_ids,
            visited: HashSet::new(),
            node_ids: HashSet::new(),
            nodes: Vec::new(),
            edges: BTreeMap::new(),
            root: None,
        }
    }

    fn finish(self, root: Option<String>) -> OperationsGraph {
        OperationsGraph {
            nodes: self.nodes,
            edges: self.edges,
            root,
        }
    }

    /// Record `parent -> child` when the child is a node and the parent is
    /// either a node or the root
    fn link(&mut self, parent: Option<&str>, child: &str) {
        let Some(parent) = parent else { return };
        if !self.node_ids.contains(child) {
            return;
        }
        let parent_allowed =
            self.node_ids.contains(parent) || self.root.as_deref() == Some(parent);
        if !parent_allowed || parent == child {
            return;
        }
        let children = self.edges.entry(parent.to_string()).or_default();
        if !children.iter().any(|c| c == child) {
            children.push(child.to_string());
        }
    }

    fn visit_pair(
        &mut self,
        initial: Option<&Entry>,
        updated: Option<&Entry>,
        parent: Option<&str>,
    ) -> Result<(), GraphError> {
        let operation = {
            let known_id = updated.and_then(Entry::id).or_else(|| initial.and_then(Entry::id));
            if let Some(id) = known_id {
                if !self.visited.insert(id.to_string()) {
                    self.link(parent, id);
                    return Ok(());
                }
            }
            classify(initial, updated, self.options, self.ids)?
        };

        let current_id = match operation {
            Some(operation) => {
                let id = operation.id().to_string();
                self.visited.insert(id.clone());
                self.node_ids.insert(id.clone());
                self.nodes.push(operation);
                self.link(parent, &id);
                Some(id)
            }
            None => updated
                .and_then(Entry::id)
                .or_else(|| initial.and_then(Entry::id))
                .map(str::to_string),
        };

        // Fields holding references on either side
        let mut reference_fields: Vec<&str> = Vec::new();
        for entry in initial.into_iter().chain(updated) {
            for name in entry.reference_fields() {
                if !reference_fields.contains(&name) {
                    reference_fields.push(name);
                }
            }
        }
        if reference_fields.is_empty() {
            return Ok(());
        }

        let initial_refs = initial
            .map(|e| e.references_in(reference_fields.iter().copied()))
            .unwrap_or_default();
        let updated_refs = updated
            .map(|e| e.references_in(reference_fields.iter().copied()))
            .unwrap_or_default();

        if initial_refs.is_empty() && updated_refs.is_empty() {
            return Ok(());
        }
        self.visit_references(&initial_refs, &updated_refs, current_id.as_deref())
    }

    /// Pair two reference lists by identity and visit each pair
    fn visit_references(
        &mut self,
        initial_refs: &[Reference<'_>],
        updated_refs: &[Reference<'_>],
        parent: Option<&str>,
    ) -> Result<(), GraphError> {
        let mut initial_by_id: HashMap<&str, &Reference<'_>> = HashMap::new();
        for reference in initial_refs {
            if let Some(id) = reference.id() {
                initial_by_id.entry(id).or_insert(reference);
            }
        }

        let mut paired: HashSet<String> = HashSet::new();
        for reference in updated_refs {
            let Reference::Entry(updated) = *reference else {
                // Unresolved links only pin their identity
                if let Some(id) = reference.id() {
                    paired.insert(id.to_string());
                }
                continue;
            };
            let Some(id) = updated.id() else {
                continue;
            };
            paired.insert(id.to_string());

            let counterpart = match initial_by_id.get(id) {
                Some(Reference::Entry(entry)) => Some(*entry),
                _ => self.initial_index.entries.get(id).copied(),
            };

            match counterpart {
                Some(initial) => self.visit_pair(Some(initial), Some(updated), parent)?,
                None if self.initial_index.known.contains(id) => {
                    // Only a link was loaded initially, content unknown
                    let placeholder = Entry::new(id);
                    self.visit_pair(Some(&placeholder), Some(updated), parent)?;
                }
                None => self.visit_pair(None, Some(updated), parent)?,
            }
        }

        for reference in initial_refs {
            let Some(id) = reference.id() else { continue };
            if paired.contains(id) || self.updated_ids.contains(id) {
                continue;
            }
            match *reference {
                Reference::Entry(initial) => self.visit_pair(Some(initial), None, parent)?,
                Reference::Link(link) if link.link_type == LinkType::Entry => {
                    let placeholder = Entry::new(id);
                    self.visit_pair(Some(&placeholder), None, parent)?;
                }
                Reference::Link(_) => {}
            }
        }

        Ok(())
    }
}
