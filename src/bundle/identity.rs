// src/bundle/identity.rs
//! Bundle identity and the file name grammar.
//!
//! A bundle file name encodes everything needed to place the bundle in a chain:
//!
//! ```text
//! {prefix}.{id}.{ref|-}.t{tier}.bundle     tiered bundle
//! {prefix}.{id}.{ref|-}.bundle             tier-less ("v2") bundle
//! ```
//!
//! `id` is a UTC `yyyyMMdd-HHmmss` stamp starting with `2`, so plain string
//! comparison of two ids orders them chronologically. The metadata sidecar is
//! the bundle file name plus `.meta.json`.
//!
//! Decoding never fails loudly: names that do not follow the grammar yield
//! `None`, since a bundle folder may hold unrelated files.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::bundle::metadata::BackupMetadata;
use crate::error::{Error, Result};
use crate::utils::fs::absolutize;

pub const BUNDLE_EXTENSION: &str = "bundle";
pub const META_SUFFIX: &str = ".meta.json";
pub const MAX_TIER: u8 = 9;

/// Marker used in place of an absent reference id.
const NO_REFERENCE: &str = "-";
const DELIMITER: char = '.';
const ID_FORMAT: &str = "%Y%m%d-%H%M%S";

// `[0-9]`, not `\d`: the latter also matches non-ASCII digits.
static BUNDLE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^2[0-9]{7}-[0-9]{6}$").expect("bundle id regex"));

/// Backup generation of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BundleTier {
    /// 0 = full backup, n > 0 = incremental on top of tier n-1.
    Tiered(u8),
    /// Historical tier-less bundle; chains by id and reference only.
    TierLess,
}

impl BundleTier {
    pub fn number(self) -> Option<u8> {
        match self {
            BundleTier::Tiered(n) => Some(n),
            BundleTier::TierLess => None,
        }
    }

    pub fn is_tier_less(self) -> bool {
        matches!(self, BundleTier::TierLess)
    }

    /// True if a bundle of tier `self` may directly reference one of tier `parent`.
    pub fn follows(self, parent: BundleTier) -> bool {
        match (self, parent) {
            (BundleTier::Tiered(n), BundleTier::Tiered(p)) => n == p + 1,
            (BundleTier::TierLess, BundleTier::TierLess) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BundleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleTier::Tiered(n) => write!(f, "t{n}"),
            BundleTier::TierLess => f.write_str("tier-less"),
        }
    }
}

/// Check if the string is a valid (and nondegenerate) bundle id.
pub fn is_valid_id(id: &str) -> bool {
    BUNDLE_ID_RE.is_match(id)
}

/// Format a UTC instant as a bundle id.
pub fn format_id(stamp: DateTime<Utc>) -> Result<String> {
    let id = stamp.format(ID_FORMAT).to_string();
    if !is_valid_id(&id) {
        return Err(Error::Format(format!(
            "time stamp {stamp} cannot be expressed as a bundle id"
        )));
    }
    Ok(id)
}

/// The UTC instant a bundle id was derived from.
pub fn id_timestamp(id: &str) -> Option<DateTime<Utc>> {
    if !is_valid_id(id) {
        return None;
    }
    NaiveDateTime::parse_from_str(id, ID_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// A backup unit: one bundle file plus its metadata sidecar.
///
/// Equality ignores `folder`; two identities are the same bundle if prefix,
/// tier, id and reference agree.
#[derive(Debug, Clone)]
pub struct BundleIdentity {
    folder: PathBuf,
    prefix: String,
    tier: BundleTier,
    id: String,
    reference_id: Option<String>,
    bundle_file_name: String,
}

impl BundleIdentity {
    /// Build and validate an identity.
    ///
    /// An empty or `-` reference is treated as no reference. A relative
    /// `folder` is resolved against the current directory.
    pub fn new(
        folder: impl Into<PathBuf>,
        prefix: impl Into<String>,
        tier: BundleTier,
        id: impl Into<String>,
        reference_id: Option<String>,
    ) -> Result<Self> {
        let prefix = prefix.into();
        let id = id.into();
        let reference_id = reference_id.filter(|r| !r.is_empty() && r != NO_REFERENCE);

        if prefix.is_empty() {
            return Err(Error::Format("the bundle prefix must not be empty".into()));
        }
        if prefix.contains(['/', '\\']) {
            return Err(Error::Format(format!(
                "the bundle prefix ({prefix}) must not contain path separators"
            )));
        }
        if let BundleTier::Tiered(n) = tier {
            if n > MAX_TIER {
                return Err(Error::Format(format!(
                    "tier {n} is out of range (0-{MAX_TIER})"
                )));
            }
        }
        if !is_valid_id(&id) {
            return Err(Error::Format(format!(
                "the id ({id}) is not in the expected format"
            )));
        }
        match &reference_id {
            Some(r) => {
                if !is_valid_id(r) {
                    return Err(Error::Format(format!(
                        "the reference id ({r}) is not in the expected format"
                    )));
                }
                if id.to_ascii_lowercase() <= r.to_ascii_lowercase() {
                    return Err(Error::Format(format!(
                        "the reference id ({r}) is expected to be older than the own id ({id})"
                    )));
                }
                if tier == BundleTier::Tiered(0) {
                    return Err(Error::Format(
                        "expecting the reference id to be '-' for a tier 0 bundle".into(),
                    ));
                }
            }
            None => {
                if let BundleTier::Tiered(n) = tier {
                    if n > 0 {
                        return Err(Error::Format(format!(
                            "a tier {n} bundle requires a reference id"
                        )));
                    }
                }
            }
        }

        let reference = reference_id.as_deref().unwrap_or(NO_REFERENCE);
        let bundle_file_name = match tier {
            BundleTier::Tiered(n) => {
                format!("{prefix}.{id}.{reference}.t{n}.{BUNDLE_EXTENSION}")
            }
            BundleTier::TierLess => format!("{prefix}.{id}.{reference}.{BUNDLE_EXTENSION}"),
        };

        let folder: PathBuf = folder.into();
        let folder = absolutize(&folder).map_err(|e| Error::io(&folder, e))?;

        Ok(Self {
            folder,
            prefix,
            tier,
            id,
            reference_id,
            bundle_file_name,
        })
    }

    /// Identity for a new full (tier 0) backup stamped at `stamp`.
    pub fn new_root(
        folder: impl Into<PathBuf>,
        prefix: impl Into<String>,
        stamp: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(folder, prefix, BundleTier::Tiered(0), format_id(stamp)?, None)
    }

    /// Identity for a new tier-less root bundle stamped at `stamp`.
    pub fn new_tier_less_root(
        folder: impl Into<PathBuf>,
        prefix: impl Into<String>,
        stamp: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(folder, prefix, BundleTier::TierLess, format_id(stamp)?, None)
    }

    /// Identity for the bundle that directly extends this one.
    pub fn derive(&self, stamp: DateTime<Utc>) -> Result<Self> {
        let next_tier = match self.tier {
            BundleTier::Tiered(n) if n >= MAX_TIER => {
                return Err(Error::Format(format!(
                    "cannot derive a bundle beyond tier {MAX_TIER} from {}",
                    self.bundle_file_name
                )));
            }
            BundleTier::Tiered(n) => BundleTier::Tiered(n + 1),
            BundleTier::TierLess => BundleTier::TierLess,
        };
        Self::new(
            self.folder.clone(),
            self.prefix.clone(),
            next_tier,
            format_id(stamp)?,
            Some(self.id.clone()),
        )
    }

    /// Decode a bundle file path. The directory part determines `folder`;
    /// relative paths resolve against the current directory.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return None;
        }
        let full = absolutize(path).ok()?;
        let name = full.file_name()?.to_str()?;
        let folder = full.parent()?;
        Self::parse_file_name(folder, name)
    }

    /// Decode a bare file name for a bundle living in `folder`.
    pub fn parse_file_name(folder: impl Into<PathBuf>, file_name: &str) -> Option<Self> {
        let segments: Vec<&str> = file_name.split(DELIMITER).collect();
        let n = segments.len();
        // 4 segments minimum for tier-less names, 5 for tiered ones
        if n < 4 {
            return None;
        }
        if !segments[n - 1].eq_ignore_ascii_case(BUNDLE_EXTENSION) {
            return None;
        }

        let tier = parse_tier_segment(segments[n - 2]);
        let (tier, tail) = match tier {
            Some(t) => {
                if n < 5 {
                    return None;
                }
                (BundleTier::Tiered(t), 4)
            }
            None => (BundleTier::TierLess, 3),
        };

        let reference = segments[n - tail + 1];
        if reference != NO_REFERENCE && !is_valid_id(reference) {
            return None;
        }
        if tier == BundleTier::Tiered(0) && reference != NO_REFERENCE {
            return None;
        }
        let id = segments[n - tail];
        if !is_valid_id(id) {
            return None;
        }
        let prefix = segments[..n - tail].join(".");
        let reference_id = (reference != NO_REFERENCE).then(|| reference.to_string());

        Self::new(folder, prefix, tier, id, reference_id).ok()
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn tier(&self) -> BundleTier {
        self.tier
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn reference_id(&self) -> Option<&str> {
        self.reference_id.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.reference_id.is_none()
    }

    pub fn bundle_file_name(&self) -> &str {
        &self.bundle_file_name
    }

    pub fn meta_file_name(&self) -> String {
        format!("{}{META_SUFFIX}", self.bundle_file_name)
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.folder.join(&self.bundle_file_name)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.folder.join(self.meta_file_name())
    }

    /// True if both the bundle file and its metadata file exist.
    pub fn exists(&self) -> bool {
        self.bundle_path().is_file() && self.meta_path().is_file()
    }

    /// Check if this bundle directly references `parent`.
    pub fn is_referencing(&self, parent: &BundleIdentity) -> bool {
        self.tier.follows(parent.tier)
            && self.prefix == parent.prefix
            && self
                .reference_id
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(&parent.id))
    }

    /// Read the metadata sidecar. Check [`exists`](Self::exists) first.
    pub fn read_metadata(&self) -> Result<BackupMetadata> {
        BackupMetadata::load(&self.meta_path())
    }

    /// Write the metadata sidecar, overwriting any existing one.
    pub fn save_metadata(&self, metadata: &BackupMetadata) -> Result<()> {
        metadata.save(&self.meta_path())
    }
}

impl PartialEq for BundleIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix
            && self.tier == other.tier
            && self.id == other.id
            && self.reference_id == other.reference_id
    }
}

impl Eq for BundleIdentity {}

impl fmt::Display for BundleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bundle_file_name)
    }
}

/// `t0`..`t9` (case-insensitive) -> tier number.
fn parse_tier_segment(segment: &str) -> Option<u8> {
    match segment.as_bytes() {
        [t, d] if t.eq_ignore_ascii_case(&b't') && d.is_ascii_digit() => Some(d - b'0'),
        _ => None,
    }
}
