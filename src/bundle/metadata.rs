// src/bundle/metadata.rs
//! Companion metadata of a bundle: which commits were the repository's tips and
//! roots when the bundle was captured. Stored as `<bundle file>.meta.json`.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt::Display, fs, path::Path};

use crate::error::{Error, Result};
use crate::graph::CommitGraph;
use crate::utils::fs::write_atomic;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Commits that no other commit names as parent (the newest commits).
    #[serde(rename = "git-bundle-tips", default)]
    pub tip_ids: BTreeSet<String>,
    /// Commits without parents (usually exactly one: the initial commit).
    #[serde(rename = "git-repo-roots", default)]
    pub root_ids: BTreeSet<String>,
    #[serde(rename = "commit-count", default)]
    pub commit_count: u64,
    #[serde(
        rename = "missing-count",
        default,
        skip_serializing_if = "is_zero"
    )]
    pub missing_count: u64,
}

/// Tip-level changes between a bundle and one of its ancestors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDiff {
    /// Tips present now but not in the ancestor.
    pub added: BTreeSet<String>,
    /// Tips of the ancestor that are no longer tips.
    pub removed: BTreeSet<String>,
}

impl MetadataDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl BackupMetadata {
    pub fn new<T, R>(tips: T, roots: R) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            tip_ids: tips.into_iter().map(Into::into).collect(),
            root_ids: roots.into_iter().map(Into::into).collect(),
            commit_count: 0,
            missing_count: 0,
        }
    }

    /// Capture tips, roots and counts from a loaded commit graph.
    ///
    /// `commit_count` counts observed commits only; placeholders for
    /// never-observed parents are reported through `missing_count`.
    pub fn from_graph<I>(graph: &CommitGraph<I>) -> Self
    where
        I: Ord + Clone + Display,
    {
        let missing = graph.missing().count() as u64;
        Self {
            tip_ids: graph.tips().map(|n| n.id().to_string()).collect(),
            root_ids: graph
                .roots()
                .filter(|n| n.is_observed())
                .map(|n| n.id().to_string())
                .collect(),
            commit_count: graph.len() as u64 - missing,
            missing_count: missing,
        }
    }

    /// Diff the tip sets of `self` against an older snapshot.
    pub fn compare_to_ancestor(&self, ancestor: &BackupMetadata) -> MetadataDiff {
        MetadataDiff {
            added: self.tip_ids.difference(&ancestor.tip_ids).cloned().collect(),
            removed: ancestor.tip_ids.difference(&self.tip_ids).cloned().collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::json(path, e))
    }

    /// Write as pretty JSON, overwriting any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| Error::json(path, e))?;
        write_atomic(path, &bytes)
    }
}
