// src/bundle/catalog.rs
//! Bundle catalog for one (folder, prefix) pair.
//!
//! - Discovery scans the folder for `*.bundle` files and decodes their names;
//!   files that do not decode, or that belong to another prefix, are ignored.
//! - Every mutation rebuilds the [`TierChain`]. A mutation whose rebuild fails
//!   is rolled back, so the catalog and its chain never disagree.
//! - Discard renames a bundle's files with a `.bak` suffix; purge deletes
//!   older `.bak` generations, keeping at most one per tier.
//! - Members of the active chain can never be discarded.
//!
//! Single writer only: nothing here guards against another process editing
//! the folder concurrently.

use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, btree_map::Entry},
    fs,
    path::{Path, PathBuf},
};

use crate::bundle::chain::TierChain;
use crate::bundle::identity::{
    BUNDLE_EXTENSION, BundleIdentity, BundleTier, MAX_TIER, format_id,
};
use crate::error::{Error, Result};
use crate::utils::fs::{STALE_SUFFIX, absolutize, append_suffix, remove_if_exists, soft_delete};

#[derive(Debug)]
pub struct BundleCatalog {
    folder: PathBuf,
    prefix: String,
    // keyed by lower-cased id; BTreeMap order == chronological order
    bundles: BTreeMap<String, BundleIdentity>,
    chain: TierChain,
}

fn id_key(id: &str) -> String {
    id.to_ascii_lowercase()
}

impl BundleCatalog {
    /// Open the catalog for `prefix` in `folder` and discover existing bundles.
    pub fn open(folder: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self> {
        let folder = folder.as_ref();
        let folder = absolutize(folder).map_err(|e| Error::io(folder, e))?;
        let mut catalog = Self {
            folder,
            prefix: prefix.into(),
            bundles: BTreeMap::new(),
            chain: TierChain::empty(),
        };
        catalog.discover()?;
        Ok(catalog)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The active chain as of the last mutation.
    pub fn chain(&self) -> &TierChain {
        &self.chain
    }

    /// All bundles, oldest id first.
    pub fn bundles(&self) -> impl Iterator<Item = &BundleIdentity> {
        self.bundles.values()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// The bundle with the lexicographically (and so chronologically) greatest id.
    pub fn latest(&self) -> Option<&BundleIdentity> {
        self.bundles.values().next_back()
    }

    /// Case-insensitive lookup by id.
    pub fn find(&self, id: &str) -> Option<&BundleIdentity> {
        self.bundles.get(&id_key(id))
    }

    /// Scan the folder and insert bundles that are not in the catalog yet.
    /// Returns the newly inserted bundles.
    pub fn discover(&mut self) -> Result<Vec<BundleIdentity>> {
        let entries = fs::read_dir(&self.folder).map_err(|e| Error::io(&self.folder, e))?;
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.folder, e))?;
            let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !has_bundle_extension(name) {
                continue;
            }
            let Some(bundle) = BundleIdentity::parse_file_name(&self.folder, name) else {
                continue;
            };
            if bundle.prefix() != self.prefix {
                continue;
            }
            found.push(bundle);
        }
        found.sort_by(|a, b| a.id().cmp(b.id()));

        let mut inserted = Vec::new();
        for bundle in found {
            if let Entry::Vacant(slot) = self.bundles.entry(id_key(bundle.id())) {
                slot.insert(bundle.clone());
                inserted.push(bundle);
            }
        }

        if let Err(e) = self.rebuild_chain() {
            for bundle in &inserted {
                self.bundles.remove(&id_key(bundle.id()));
            }
            return Err(e);
        }
        tracing::debug!(
            folder = %self.folder.display(),
            prefix = %self.prefix,
            discovered = inserted.len(),
            total = self.bundles.len(),
            "bundle discovery"
        );
        Ok(inserted)
    }

    /// Add a bundle whose files have just been written.
    ///
    /// Returns `false` without changes if its files are missing, it belongs to
    /// another folder or prefix, or its id is already known.
    pub fn add(&mut self, bundle: BundleIdentity) -> Result<bool> {
        if bundle.prefix() != self.prefix || bundle.folder() != self.folder {
            tracing::warn!(
                bundle = %bundle,
                folder = %bundle.folder().display(),
                "bundle does not belong to this catalog"
            );
            return Ok(false);
        }
        if !bundle.exists() {
            tracing::warn!(bundle = %bundle, "bundle or metadata file missing; not added");
            return Ok(false);
        }
        let key = id_key(bundle.id());
        if self.bundles.contains_key(&key) {
            return Ok(false);
        }
        self.bundles.insert(key.clone(), bundle);
        if let Err(e) = self.rebuild_chain() {
            self.bundles.remove(&key);
            return Err(e);
        }
        Ok(true)
    }

    /// Propose the identity of the next backup, stamped now.
    pub fn next_bundle(&self, desired_tier: u8) -> Result<BundleIdentity> {
        self.next_bundle_at(desired_tier, Utc::now())
    }

    /// Propose the identity of the next backup, stamped at `stamp`.
    ///
    /// `desired_tier` is lowered to the chain depth when needed (tiers cannot
    /// be skipped). The result is not added to the catalog.
    pub fn next_bundle_at(&self, desired_tier: u8, stamp: DateTime<Utc>) -> Result<BundleIdentity> {
        if desired_tier > MAX_TIER {
            return Err(Error::Format(format!(
                "expecting a tier in the range 0-{MAX_TIER}, got {desired_tier}"
            )));
        }
        let id = format_id(stamp)?;

        if self.chain.is_tier_less() {
            // tier-less chains only grow at the top or restart from a root
            let reference = match desired_tier {
                0 => None,
                _ => self.chain.top().map(|b| b.id().to_string()),
            };
            return BundleIdentity::new(
                self.folder.clone(),
                self.prefix.clone(),
                BundleTier::TierLess,
                id,
                reference,
            );
        }

        let tier = (desired_tier as usize).min(self.chain.depth()) as u8;
        let reference = match tier {
            0 => None,
            t => self.chain.get(t as usize - 1).map(|b| b.id().to_string()),
        };
        BundleIdentity::new(
            self.folder.clone(),
            self.prefix.clone(),
            BundleTier::Tiered(tier),
            id,
            reference,
        )
    }

    /// Resolve the bundle that `bundle` references.
    ///
    /// `Ok(None)` if there is no reference or the referenced id is unknown;
    /// an error if the referenced bundle has a tier that does not fit.
    pub fn find_referenced_bundle(&self, bundle: &BundleIdentity) -> Result<Option<&BundleIdentity>> {
        let Some(reference) = bundle.reference_id() else {
            return Ok(None);
        };
        let Some(referenced) = self.find(reference) else {
            return Ok(None);
        };
        if !bundle.tier().follows(referenced.tier()) {
            return Err(Error::InconsistentChain {
                bundle: bundle.bundle_file_name().to_string(),
                reference: referenced.bundle_file_name().to_string(),
            });
        }
        Ok(Some(referenced))
    }

    /// Discard the bundle with the given id: soft-delete its files and drop it
    /// from the catalog. Unknown ids are ignored.
    pub fn discard_by_id(&mut self, id: &str) -> Result<Option<BundleIdentity>> {
        let key = id_key(id);
        let Some(bundle) = self.bundles.get(&key) else {
            return Ok(None);
        };
        if self.chain.contains(bundle) {
            return Err(Error::ActiveChain(bundle.bundle_file_name().to_string()));
        }
        let bundle_path = bundle.bundle_path();
        let meta_path = bundle.meta_path();
        let stale_bundle = soft_delete(&bundle_path).map_err(|e| Error::io(&bundle_path, e))?;
        if let Err(e) = soft_delete(&meta_path) {
            // both files go stale together or not at all
            if let Some(stale) = stale_bundle {
                if let Err(undo) = fs::rename(&stale, &bundle_path) {
                    tracing::warn!(
                        bundle = %bundle,
                        error = %undo,
                        "could not restore bundle file after failed discard"
                    );
                }
            }
            return Err(Error::io(&meta_path, e));
        }
        let Some(bundle) = self.bundles.remove(&key) else {
            return Ok(None);
        };
        tracing::info!(bundle = %bundle, "bundle discarded");
        self.rebuild_chain()?;
        Ok(Some(bundle))
    }

    pub fn discard(&mut self, bundle: &BundleIdentity) -> Result<Option<BundleIdentity>> {
        self.discard_by_id(bundle.id())
    }

    /// Discard every bundle that is not part of the active chain.
    pub fn discard_unused(&mut self) -> Result<Vec<BundleIdentity>> {
        let unused: Vec<String> = self
            .bundles
            .values()
            .filter(|b| !self.chain.contains(b))
            .map(|b| b.id().to_string())
            .collect();
        let mut discarded = Vec::with_capacity(unused.len());
        for id in unused {
            if let Some(bundle) = self.discard_by_id(&id)? {
                discarded.push(bundle);
            }
        }
        Ok(discarded)
    }

    /// Delete old soft-deleted files, keeping the newest stale generation per
    /// tier. Works from the folder listing, not from the catalog.
    /// Returns the deleted paths.
    pub fn purge(&self) -> Result<Vec<PathBuf>> {
        let mut by_tier: BTreeMap<BundleTier, Vec<BundleIdentity>> = BTreeMap::new();
        if self.folder.is_dir() {
            let stale_ext = format!(".{BUNDLE_EXTENSION}{STALE_SUFFIX}");
            let entries = fs::read_dir(&self.folder).map_err(|e| Error::io(&self.folder, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| Error::io(&self.folder, e))?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                let Some(live_name) = name.strip_suffix(STALE_SUFFIX) else {
                    continue;
                };
                if !name.to_ascii_lowercase().ends_with(&stale_ext) {
                    continue;
                }
                match BundleIdentity::parse_file_name(&self.folder, live_name) {
                    Some(bundle) if bundle.prefix() == self.prefix => {
                        by_tier.entry(bundle.tier()).or_default().push(bundle);
                    }
                    Some(_) => {}
                    None => {
                        tracing::warn!(file = name, "skipping unparsable stale bundle file");
                    }
                }
            }
        }

        let mut purged = Vec::new();
        for (tier, mut ghosts) in by_tier {
            ghosts.sort_by(|a, b| b.id().cmp(a.id()));
            for ghost in ghosts.into_iter().skip(1) {
                for live in [ghost.bundle_path(), ghost.meta_path()] {
                    let stale = append_suffix(&live, STALE_SUFFIX);
                    if remove_if_exists(&stale).map_err(|e| Error::io(&stale, e))? {
                        purged.push(stale);
                    }
                }
                tracing::info!(bundle = %ghost, %tier, "stale bundle purged");
            }
        }
        Ok(purged)
    }

    /// Recompute the chain from the current members.
    pub fn rebuild_chain(&mut self) -> Result<()> {
        self.chain = TierChain::rebuild(self)?;
        Ok(())
    }
}

fn has_bundle_extension(name: &str) -> bool {
    name.to_ascii_lowercase()
        .ends_with(&format!(".{BUNDLE_EXTENSION}"))
}
