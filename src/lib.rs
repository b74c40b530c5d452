//! gitbup-core: bookkeeping for tiered git bundle backups.
//!
//! - [`bundle`]: bundle file name grammar, the per-folder catalog with
//!   discard/purge lifecycle, and the active tier chain.
//! - [`graph`]: commit DAG built from `(id, parents)` log records.
//! - [`config`]: global and per-repository settings values.
//!
//! Creating bundle contents and running git are left to the caller.

pub mod bundle;
pub mod config;
pub mod error;
pub mod graph;
pub mod utils;

pub use bundle::{BackupMetadata, BundleCatalog, BundleIdentity, BundleTier, TierChain};
pub use error::{Error, Result};
pub use graph::{CommitGraph, CommitId, CommitNode, CommitRecord};
