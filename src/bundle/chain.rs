// src/bundle/chain.rs
//! The active backup lineage: one bundle per tier, each referencing the
//! previous tier. Always derived from a [`BundleCatalog`], never edited directly.

use crate::bundle::catalog::BundleCatalog;
use crate::bundle::identity::{BundleIdentity, BundleTier};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierChain {
    // index 0 is the root
    tiers: Vec<BundleIdentity>,
}

impl TierChain {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the chain that ends in the newest bundle of `catalog`.
    ///
    /// Walks reference links backward from the maximal id until a bundle
    /// without reference. A reference that cannot be resolved is fatal.
    pub fn rebuild(catalog: &BundleCatalog) -> Result<Self> {
        let Some(latest) = catalog.latest() else {
            tracing::debug!(prefix = catalog.prefix(), "empty catalog, empty tier chain");
            return Ok(Self::empty());
        };

        let mut walked = vec![latest.clone()];
        let mut current = latest;
        while let Some(reference) = current.reference_id() {
            let previous = catalog.find_referenced_bundle(current)?.ok_or_else(|| {
                Error::BrokenChain {
                    bundle: current.bundle_file_name().to_string(),
                    reference: reference.to_string(),
                }
            })?;
            walked.push(previous.clone());
            current = previous;
        }
        walked.reverse();

        tracing::debug!(
            prefix = catalog.prefix(),
            depth = walked.len(),
            top = walked.last().map(|b| b.id()).unwrap_or_default(),
            "tier chain rebuilt"
        );
        Ok(Self { tiers: walked })
    }

    /// Number of links; for a tiered chain also the maximum tier + 1.
    pub fn depth(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn tiers(&self) -> &[BundleIdentity] {
        &self.tiers
    }

    pub fn get(&self, index: usize) -> Option<&BundleIdentity> {
        self.tiers.get(index)
    }

    /// The newest bundle (end of the chain).
    pub fn top(&self) -> Option<&BundleIdentity> {
        self.tiers.last()
    }

    /// True if the chain is made of tier-less bundles.
    pub fn is_tier_less(&self) -> bool {
        self.top().is_some_and(|b| b.tier().is_tier_less())
    }

    /// True if `bundle` is one of the links of this chain.
    pub fn contains(&self, bundle: &BundleIdentity) -> bool {
        match bundle.tier() {
            BundleTier::Tiered(n) => self
                .tiers
                .get(n as usize)
                .is_some_and(|b| b.tier() == bundle.tier() && b.id().eq_ignore_ascii_case(bundle.id())),
            BundleTier::TierLess => self
                .tiers
                .iter()
                .any(|b| b.tier().is_tier_less() && b.id().eq_ignore_ascii_case(bundle.id())),
        }
    }
}
