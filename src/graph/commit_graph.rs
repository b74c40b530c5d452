// src/graph/commit_graph.rs
//! In-memory commit DAG built from `(id, parents)` records.
//!
//! - Records arrive one at a time, newest first or in any order.
//! - A parent named before its own record arrives gets a placeholder node
//!   (`observed = false`). Placeholders that never get a record are "missing",
//!   as happens with shallow clones or partial logs.
//! - Children are back-references (ids), never owned; removing a node means
//!   fixing up the parent lists of its children explicitly.
//! - Derived views (`roots`, `tips`, `missing`) are plain scans, computed on
//!   demand.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitNode<I> {
    id: I,
    parents: Vec<I>,
    children: BTreeSet<I>,
    observed: bool,
}

impl<I: Ord + Clone> CommitNode<I> {
    fn placeholder(id: I) -> Self {
        Self {
            id,
            parents: Vec::new(),
            children: BTreeSet::new(),
            observed: false,
        }
    }

    pub fn id(&self) -> &I {
        &self.id
    }

    /// Parent ids in record order (first parent first).
    pub fn parents(&self) -> &[I] {
        &self.parents
    }

    /// Ids of the nodes that name this node as a parent.
    pub fn children(&self) -> &BTreeSet<I> {
        &self.children
    }

    /// True once this node's own record has been inserted.
    pub fn is_observed(&self) -> bool {
        self.observed
    }
}

/// One commit as delivered by the log reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord<I> {
    pub id: I,
    pub parents: Vec<I>,
}

impl<I> CommitRecord<I> {
    pub fn new(id: I, parents: impl IntoIterator<Item = I>) -> Self {
        Self {
            id,
            parents: parents.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitGraph<I> {
    nodes: BTreeMap<I, CommitNode<I>>,
}

impl<I> Default for CommitGraph<I> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }
}

impl<I> CommitGraph<I>
where
    I: Ord + Clone + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a commit record and link it to its parents.
    ///
    /// Fails if a record for `id` was inserted before. A placeholder created
    /// because `id` was named as a parent is upgraded in place.
    pub fn insert(&mut self, id: I, parents: impl IntoIterator<Item = I>) -> Result<()> {
        if self.nodes.get(&id).is_some_and(|n| n.observed) {
            return Err(Error::DuplicateNode(id.to_string()));
        }
        let parents: Vec<I> = parents.into_iter().collect();
        for parent in &parents {
            self.get_or_create(parent).children.insert(id.clone());
        }
        let node = self.get_or_create(&id);
        node.parents = parents;
        node.observed = true;
        Ok(())
    }

    /// Insert records until the input ends or a record fails.
    /// Returns how many records were inserted.
    pub fn ingest<T>(&mut self, records: T) -> Result<usize>
    where
        T: IntoIterator<Item = CommitRecord<I>>,
    {
        let mut count = 0usize;
        for record in records {
            self.insert(record.id, record.parents)?;
            count += 1;
        }
        Ok(count)
    }

    fn get_or_create(&mut self, id: &I) -> &mut CommitNode<I> {
        self.nodes
            .entry(id.clone())
            .or_insert_with(|| CommitNode::placeholder(id.clone()))
    }

    pub fn find(&self, id: &I) -> Option<&CommitNode<I>> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &I) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &CommitNode<I>> {
        self.nodes.values()
    }

    /// Number of nodes, placeholders included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes without parents. Before pruning this includes missing placeholders.
    pub fn roots(&self) -> impl Iterator<Item = &CommitNode<I>> {
        self.nodes.values().filter(|n| n.parents.is_empty())
    }

    /// Nodes that no other node names as parent (the newest commits).
    pub fn tips(&self) -> impl Iterator<Item = &CommitNode<I>> {
        self.nodes.values().filter(|n| n.children.is_empty())
    }

    /// Nodes referenced as a parent whose own record never arrived.
    pub fn missing(&self) -> impl Iterator<Item = &CommitNode<I>> {
        self.nodes.values().filter(|n| !n.observed)
    }

    pub fn is_complete(&self) -> bool {
        self.missing().next().is_none()
    }

    /// Remove all missing nodes and strip them from their children's parent
    /// lists. Returns the removed nodes.
    pub fn prune_missing(&mut self) -> Vec<CommitNode<I>> {
        let missing: Vec<I> = self.missing().map(|n| n.id.clone()).collect();
        let mut pruned = Vec::with_capacity(missing.len());
        for id in missing {
            let Some(node) = self.nodes.remove(&id) else {
                continue;
            };
            for child_id in &node.children {
                if let Some(child) = self.nodes.get_mut(child_id) {
                    child.parents.retain(|p| p != &id);
                }
            }
            pruned.push(node);
        }
        if !pruned.is_empty() {
            tracing::info!(
                pruned = pruned.len(),
                remaining = self.nodes.len(),
                "pruned missing commits"
            );
        }
        pruned
    }
}
