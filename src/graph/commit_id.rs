// src/graph/commit_id.rs

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

/// Full hex object id of a commit (SHA-1 or SHA-256), stored lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    pub const SHA1_LEN: usize = 40;
    pub const SHA256_LEN: usize = 64;
    const SHORT_LEN: usize = 8;

    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let len_ok = text.len() == Self::SHA1_LEN || text.len() == Self::SHA256_LEN;
        if !len_ok || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Format(format!("not a commit id: '{text}'")));
        }
        Ok(Self(text.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display.
    pub fn short(&self) -> &str {
        &self.0[..Self::SHORT_LEN]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommitId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommitId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}
