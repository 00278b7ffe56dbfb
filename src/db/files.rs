// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed record I/O over the repository file tree.
//!
//! Provides:
//! - Reads that distinguish missing, malformed and schema-invalid files
//! - Atomic writes (temp file in the target directory, then rename)
//! - Glob enumeration relative to the repository root
//!
//! The file extension selects the format: `.yaml`/`.yml` is YAML, anything
//! else is pretty-printed JSON.

use crate::error::{AppError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use validator::Validate;

/// Distinguishes temp files of concurrent writers within one process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

/// Handle on a repository root.
#[derive(Debug, Clone)]
pub struct FileDb {
    root: PathBuf,
}

impl FileDb {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a repository-relative one.
    pub fn absolute(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    pub fn exists(&self, rel: impl AsRef<Path>) -> bool {
        self.absolute(rel).is_file()
    }

    // ─── Reads ───────────────────────────────────────────────────

    /// Read and validate a record; a missing file is `AppError::NotFound`.
    pub fn read<T>(&self, rel: impl AsRef<Path>) -> Result<T>
    where
        T: DeserializeOwned + Validate,
    {
        let rel = rel.as_ref();
        self.read_optional(rel)?
            .ok_or_else(|| AppError::NotFound(rel.to_path_buf()))
    }

    /// Read and validate a record; a missing file is `Ok(None)`.
    pub fn read_optional<T>(&self, rel: impl AsRef<Path>) -> Result<Option<T>>
    where
        T: DeserializeOwned + Validate,
    {
        let rel = rel.as_ref();
        let text = match fs::read_to_string(self.absolute(rel)) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Io(e)),
        };

        let value: T = match Format::for_path(rel) {
            Format::Yaml => serde_yaml::from_str(&text).map_err(|e| AppError::parse(rel, e))?,
            Format::Json => serde_json::from_str(&text).map_err(|e| AppError::parse(rel, e))?,
        };
        value
            .validate()
            .map_err(|e| AppError::validation(rel, e))?;

        Ok(Some(value))
    }

    // ─── Writes ──────────────────────────────────────────────────

    /// Validate, serialize and atomically replace `rel`.
    pub fn write<T>(&self, rel: impl AsRef<Path>, value: &T) -> Result<()>
    where
        T: Serialize + Validate,
    {
        let rel = rel.as_ref();
        let bytes = encode(rel, value)?;
        self.write_bytes(rel, &bytes)
    }

    /// Atomically replace `rel` with `bytes`.
    ///
    /// Readers see either the previous complete file or the new one.
    pub fn write_bytes(&self, rel: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
        let target = self.absolute(rel);
        let parent = target
            .parent()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("no parent for {:?}", target)))?;
        fs::create_dir_all(parent).map_err(|e| AppError::write(&target, e))?;

        let tmp = temp_path_for(&target);
        if let Err(e) = write_and_sync(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(AppError::write(&target, e));
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(AppError::write(&target, e));
        }
        sync_dir(parent).map_err(|e| AppError::write(&target, e))?;
        Ok(())
    }

    /// Create `rel` only if it does not exist yet.
    ///
    /// Returns `false` when another writer got there first.
    pub fn create_new<T>(&self, rel: impl AsRef<Path>, value: &T) -> Result<bool>
    where
        T: Serialize + Validate,
    {
        let rel = rel.as_ref();
        let bytes = encode(rel, value)?;
        let target = self.absolute(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| AppError::write(&target, e))?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(AppError::write(&target, e)),
        };
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| AppError::write(&target, e))?;
        Ok(true)
    }

    /// Delete `rel`. Returns whether a file was removed.
    pub fn remove(&self, rel: impl AsRef<Path>) -> Result<bool> {
        match fs::remove_file(self.absolute(rel)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    // ─── Enumeration ─────────────────────────────────────────────

    /// Repository-relative paths matching a glob pattern, sorted.
    ///
    /// Hidden files (temp files, the id index) never match a wildcard.
    pub fn list(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let full = format!("{}/{}", root.trim_end_matches('/'), pattern);
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };

        let entries = glob::glob_with(&full, options)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("bad pattern {:?}: {}", pattern, e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => {
                    if let Ok(rel) = path.strip_prefix(&self.root) {
                        paths.push(rel.to_path_buf());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable path during scan"),
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn encode<T>(rel: &Path, value: &T) -> Result<Vec<u8>>
where
    T: Serialize + Validate,
{
    value
        .validate()
        .map_err(|e| AppError::validation(rel, e))?;

    match Format::for_path(rel) {
        Format::Yaml => serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("YAML encode {:?}: {}", rel, e))),
        Format::Json => serde_json::to_vec_pretty(value)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON encode {:?}: {}", rel, e))),
    }
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), seq))
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

fn sync_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        fs::File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}
