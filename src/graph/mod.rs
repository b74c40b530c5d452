// src/graph/mod.rs

pub mod commit_graph; // DAG of (id, parents) records, missing-node pruning
pub mod commit_id;    // hex commit id used as the usual graph key

pub use commit_graph::{CommitGraph, CommitNode, CommitRecord};
pub use commit_id::CommitId;
