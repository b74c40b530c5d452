// src/utils/fs.rs
//! Small filesystem helpers shared by the bundle catalog and the config files.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Suffix appended to the full file name of a soft-deleted file.
pub const STALE_SUFFIX: &str = ".bak";

/// Replace `path` with `bytes` through a sibling `.tmp` file, creating
/// missing parent folders. Readers see either the old or the new content.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |e| Error::io(path, e);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = append_suffix(path, ".tmp");
    let mut file = fs::File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::io(&tmp, e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(io_err)
}

/// `path` with `suffix` appended to its file name (`a.bundle` -> `a.bundle.bak`).
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Rename `path` to its stale name, replacing any earlier stale file.
/// Returns the stale path, or `None` when `path` did not exist.
pub fn soft_delete(path: &Path) -> io::Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }
    let stale = append_suffix(path, STALE_SUFFIX);
    if stale.exists() {
        fs::remove_file(&stale)?;
    }
    fs::rename(path, &stale)?;
    Ok(Some(stale))
}

/// Delete `path` if it is a file. Returns whether something was deleted.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Resolve `value` against the current directory when it is relative.
/// An empty path means the current directory itself.
pub fn absolutize(value: &Path) -> io::Result<PathBuf> {
    if value.is_absolute() {
        Ok(value.to_path_buf())
    } else {
        let cwd = std::env::current_dir()?;
        if value.as_os_str().is_empty() {
            Ok(cwd)
        } else {
            Ok(cwd.join(value))
        }
    }
}
