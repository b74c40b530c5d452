// src/config.rs
//! Global and per-repository settings.
//!
//! Both are plain values: the caller loads them, passes them where needed and
//! saves them back. Fields this version does not know are kept in
//! `other_fields` so that saving never drops them.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::BundleCatalog;
use crate::error::Error;
use crate::utils::fs::{absolutize, write_atomic};

pub const GLOBAL_CONFIG_FILE: &str = "gitbup.global-config.json";
pub const REPO_CONFIG_FILE: &str = "gitbup.repo.json";
pub const LOCAL_TARGET_DIR: &str = "gitbup-bundles";

const INVALID_LABEL_CHARS: &[char] = &['\\', '/', ':', ';', '\'', '"'];

/// Machine-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitBupConfig {
    /// Anchor tag -> folder under which per-repository bundle folders live.
    #[serde(default)]
    pub anchor_folders: BTreeMap<String, PathBuf>,
    /// Location of the git executable; `None` means "find it on PATH".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_path: Option<PathBuf>,
    #[serde(flatten)]
    pub other_fields: Map<String, Value>,
}

impl GitBupConfig {
    /// `<local data dir>/gitbup/gitbup.global-config.json`, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("gitbup").join(GLOBAL_CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        match read_json(path)? {
            Some(cfg) => Ok(cfg),
            None => {
                tracing::info!(
                    "No config file found at {}. Using GitBupConfig::default().",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    /// Add, change or (with `None`) remove an anchor. A new anchor folder must exist.
    pub fn set_anchor(&mut self, tag: &str, folder: Option<&Path>) -> Result<()> {
        match folder {
            None => {
                self.anchor_folders.remove(tag);
            }
            Some(folder) => {
                if !folder.is_dir() {
                    bail!("directory not found: '{}'", folder.display());
                }
                let folder = absolutize(folder)
                    .with_context(|| format!("resolving {}", folder.display()))?;
                self.anchor_folders.insert(tag.to_string(), folder);
            }
        }
        Ok(())
    }

    pub fn find_anchor(&self, tag: &str) -> Option<&Path> {
        self.anchor_folders.get(tag).map(PathBuf::as_path)
    }
}

/// Settings of one repository, stored inside its git folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoConfig {
    /// Label used as bundle prefix.
    pub repo_name: String,
    /// Folder holding the bundles; `None` until configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_folder: Option<PathBuf>,
    #[serde(flatten)]
    pub other_fields: Map<String, Value>,
}

impl RepoConfig {
    pub fn new(repo_name: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
            target_folder: None,
            other_fields: Map::new(),
        }
    }

    pub fn path_in(git_dir: &Path) -> PathBuf {
        git_dir.join(REPO_CONFIG_FILE)
    }

    /// Load the repository settings; `None` if the repository has none yet.
    pub fn load(git_dir: &Path) -> Result<Option<Self>> {
        read_json(&Self::path_in(git_dir))
    }

    /// Load the settings, or start fresh with `default_label` and no target.
    pub fn load_or_default(git_dir: &Path, default_label: &str) -> Result<Self> {
        match Self::load(git_dir)? {
            Some(cfg) => Ok(cfg),
            None => {
                tracing::info!(
                    "No repository config in {}. Using label '{}'.",
                    git_dir.display(),
                    default_label
                );
                Ok(Self::new(default_label))
            }
        }
    }

    pub fn save(&self, git_dir: &Path) -> Result<()> {
        write_json(&Self::path_in(git_dir), self)
    }

    /// A label doubles as bundle prefix and folder name, so it must be usable as both.
    pub fn validate_label(label: &str) -> crate::error::Result<()> {
        if label.is_empty() || label.contains(INVALID_LABEL_CHARS) {
            return Err(Error::Format(format!(
                "that repo name contains invalid characters: '{label}'"
            )));
        }
        if label.starts_with('.') {
            return Err(Error::Format(
                "invalid repo name (first character cannot be '.')".into(),
            ));
        }
        Ok(())
    }

    pub fn set_label(&mut self, label: &str) -> crate::error::Result<()> {
        Self::validate_label(label)?;
        self.repo_name = label.to_string();
        Ok(())
    }

    /// Use an existing folder as target.
    pub fn set_target(&mut self, folder: &Path) -> Result<()> {
        let folder =
            absolutize(folder).with_context(|| format!("resolving {}", folder.display()))?;
        if !folder.is_dir() {
            bail!("the target folder does not exist: '{}'", folder.display());
        }
        self.target_folder = Some(folder);
        Ok(())
    }

    pub fn clear_target(&mut self) {
        self.target_folder = None;
    }

    /// Target `<git_dir>/gitbup-bundles`, creating it when needed.
    pub fn set_target_local(&mut self, git_dir: &Path) -> Result<PathBuf> {
        let target = git_dir.join(LOCAL_TARGET_DIR);
        fs::create_dir_all(&target)
            .with_context(|| format!("create_dir_all({:?})", target))?;
        self.set_target(&target)?;
        Ok(target)
    }

    /// Target `<anchor>/<repo_name>` for a known anchor tag, creating it when needed.
    pub fn set_target_anchored(&mut self, global: &GitBupConfig, tag: &str) -> Result<PathBuf> {
        let Some(anchor) = global.find_anchor(tag) else {
            bail!("unknown anchor folder tag: '{tag}'");
        };
        if !anchor.is_dir() {
            bail!(
                "the anchor folder '{tag}' no longer exists: {}",
                anchor.display()
            );
        }
        let target = anchor.join(&self.repo_name);
        fs::create_dir_all(&target)
            .with_context(|| format!("create_dir_all({:?})", target))?;
        self.set_target(&target)?;
        Ok(target)
    }

    /// The configured target folder, if it still exists.
    pub fn target(&self) -> Option<&Path> {
        self.target_folder
            .as_deref()
            .filter(|p| p.is_dir())
    }

    /// Open the bundle catalog for this repository's target folder.
    pub fn open_catalog(&self) -> Result<BundleCatalog> {
        let Some(target) = self.target() else {
            bail!(
                "no existing target folder configured for repository '{}'",
                self.repo_name
            );
        };
        BundleCatalog::open(target, self.repo_name.clone())
            .with_context(|| format!("opening bundle catalog in {}", target.display()))
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str::<T>(&text)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).with_context(|| format!("writing config file {}", path.display()))
}
