// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Trainload: training-load metrics over a file-backed activity store
//!
//! This crate syncs activities from Strava into a versionable file tree,
//! computes per-activity load, and derives daily fitness, fatigue, form,
//! workload ratio and readiness metrics from the stored history.

pub mod config;
pub mod db;
pub mod error;
pub mod lock;
pub mod models;
pub mod services;
pub mod time_utils;

pub use config::Config;
pub use error::{AppError, Result};
