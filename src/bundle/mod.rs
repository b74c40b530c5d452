// src/bundle/mod.rs

pub mod identity;   // file name grammar <-> BundleIdentity
pub mod metadata;   // .meta.json sidecar (tips, roots, counts)
pub mod catalog;    // bundles of one (folder, prefix); discard / purge
pub mod chain;      // active tier chain, derived from the catalog

pub use catalog::BundleCatalog;
pub use chain::TierChain;
pub use identity::{BundleIdentity, BundleTier, format_id, id_timestamp, is_valid_id};
pub use metadata::{BackupMetadata, MetadataDiff};
