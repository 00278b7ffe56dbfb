// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared by the repository, lock manager,
//! metrics engine and sync pipeline.

use std::path::{Path, PathBuf};

/// Application error type.
///
/// Expected conditions (missing file, invalid record, lock contention,
/// upstream rate limiting) each get their own variant so callers can
/// branch on them instead of parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid record {}: {message}", path.display())]
    Validation { path: PathBuf, message: String },

    #[error("Timed out after {waited_ms}ms waiting for lock (held by {holder})")]
    LockTimeout { holder: String, waited_ms: u64 },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Strava rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Strava API error: {0}")]
    Network(String),

    #[error("Strava authorization failed: {0}")]
    Auth(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn parse(path: &Path, err: impl std::fmt::Display) -> Self {
        AppError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn validation(path: &Path, err: impl std::fmt::Display) -> Self {
        AppError::Validation {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn write(path: &Path, source: std::io::Error) -> Self {
        AppError::Write {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Rate limiting ends a sync early but is not a failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimited(_))
    }

    /// Errors raised by the upstream activity source.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited(_) | AppError::Network(_) | AppError::Auth(_)
        )
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;
