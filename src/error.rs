// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the bundle catalog, the tier chain and the commit graph.
///
/// Every variant except `Io` and `Json` reports a structural or data invariant
/// violation. None of them is retried internally.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed identity component (bundle id, tier, prefix, commit id, label).
    #[error("format error: {0}")]
    Format(String),

    /// A commit record was ingested twice.
    #[error("duplicate node: {0}")]
    DuplicateNode(String),

    /// A chain link points at a bundle that is not in the catalog.
    #[error("the bundle referenced by '{bundle}' is missing (expected id {reference})")]
    BrokenChain { bundle: String, reference: String },

    /// A chain link resolves, but to a bundle of the wrong tier.
    #[error("inconsistent tier linkage from '{bundle}' to '{reference}'")]
    InconsistentChain { bundle: String, reference: String },

    /// Attempt to discard a bundle that is part of the active chain.
    #[error("cannot discard a bundle that is still in active use: {0}")]
    ActiveChain(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}
