// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Duplicate detection for incoming activities.
//!
//! Two checks, cheapest first:
//! 1. Exact: an activity with the same id is already stored.
//! 2. Fuzzy: an activity on the same local date starts within the start
//!    tolerance and has (nearly) the same duration. This catches sessions
//!    that were logged by hand and later also reported upstream.

use std::path::PathBuf;

use crate::config::DedupSettings;
use crate::db::ActivityStore;
use crate::error::Result;
use crate::models::Activity;

/// Why an incoming activity was judged a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Duplicate {
    /// Same id already on disk
    Exact(PathBuf),
    /// Same session under a different id
    Fuzzy { existing_id: String },
}

#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    store: ActivityStore,
    settings: DedupSettings,
}

impl DuplicateDetector {
    pub fn new(store: ActivityStore, settings: DedupSettings) -> Self {
        Self { store, settings }
    }

    pub fn exact(&self, id: &str) -> Result<Option<Duplicate>> {
        Ok(self.store.find_by_id(id)?.map(Duplicate::Exact))
    }

    pub fn fuzzy(&self, candidate: &Activity) -> Result<Option<Duplicate>> {
        let same_day = self.store.list_on_date(candidate.date)?;
        Ok(same_day
            .activities
            .iter()
            .filter(|existing| existing.id != candidate.id)
            .find(|existing| is_same_session(existing, candidate, &self.settings))
            .map(|existing| Duplicate::Fuzzy {
                existing_id: existing.id.clone(),
            }))
    }
}

/// Same date, start within tolerance, duration within tolerance.
pub fn is_same_session(a: &Activity, b: &Activity, settings: &DedupSettings) -> bool {
    if a.date != b.date {
        return false;
    }
    let start_gap_secs = (a.start_time - b.start_time).num_seconds().abs();
    let duration_gap = a.duration_secs.abs_diff(b.duration_secs);
    start_gap_secs <= settings.start_tolerance.num_seconds()
        && duration_gap <= settings.duration_tolerance_secs
}
