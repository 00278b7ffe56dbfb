// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Sync bookkeeping: resume state, progress heartbeat and run reports.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::LockRecord;

/// Where an interrupted sync should pick up.
///
/// While `backfill_in_progress` is set the next sync refetches the same
/// window, `(resume_after_timestamp, resume_before_timestamp)`, starting at
/// `resume_page` instead of opening a fresh one. Both bounds are fixed when
/// the window opens so page numbers stay meaningful across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResumeState {
    #[serde(default)]
    pub backfill_in_progress: bool,
    #[serde(default)]
    pub target_start_date: Option<NaiveDate>,
    /// Exclusive lower bound of the open window (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_after_timestamp: Option<i64>,
    /// Exclusive upper bound of the open window (unix seconds): the start of
    /// the run that opened it. Becomes `last_sync_at` once drained.
    #[serde(default)]
    pub resume_before_timestamp: Option<i64>,
    /// First page of the window not yet completely handled
    #[serde(default)]
    pub resume_page: Option<u32>,
    #[serde(default)]
    pub last_progress_at: Option<DateTime<Utc>>,
}

impl SyncResumeState {
    /// True when the next run must continue a windowed fetch.
    pub fn should_resume(&self) -> bool {
        self.backfill_in_progress && self.target_start_date.is_some()
    }

    /// Page to request next, 1-based.
    pub fn next_page(&self) -> u32 {
        self.resume_page.unwrap_or(1).max(1)
    }
}

/// Athlete-level sync history.
///
/// Stored at: `data/athlete/training_history.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct TrainingHistory {
    /// Start of the last sync that drained its window
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_outcome: Option<SyncOutcome>,
    /// Running total of activities imported by sync
    #[serde(default)]
    pub activities_imported: u64,
    #[serde(default)]
    pub earliest_activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub sync: SyncResumeState,
}

/// Phases of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    Fetching,
    Processing,
    Metrics,
    Done,
    PausedRateLimit,
    Failed,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Done | SyncPhase::PausedRateLimit | SyncPhase::Failed
        )
    }
}

/// Heartbeat written while a sync is running.
///
/// Stored at: `config/.sync_progress.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SyncProgress {
    pub pid: u32,
    pub phase: SyncPhase,
    pub seen: u32,
    pub imported: u32,
    pub skipped: u32,
    pub failed: u32,
    /// Page of the fetch window being handled
    pub page: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Coarse result of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Succeeded,
    /// Partial success; retry later to continue
    RateLimited,
    Failed,
}

impl SyncOutcome {
    /// Rate-limited runs count as success: everything imported is durable.
    pub fn is_success(&self) -> bool {
        !matches!(self, SyncOutcome::Failed)
    }
}

/// Result of a sync run. Counts always reflect what is durably on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub imported: u32,
    pub skipped: u32,
    pub failed: u32,
    pub phase: SyncPhase,
    pub rate_limited: bool,
    /// Per-activity and fatal errors
    pub errors: Vec<String>,
    /// Failures of best-effort post-steps (profile, metrics)
    pub warnings: Vec<String>,
    pub imported_ids: Vec<String>,
    /// Earliest and latest dates of imported activities
    pub affected_dates: Option<(NaiveDate, NaiveDate)>,
    /// Number of daily metric records recomputed
    pub metrics_recomputed: u32,
}

impl SyncReport {
    pub fn new() -> Self {
        Self {
            imported: 0,
            skipped: 0,
            failed: 0,
            phase: SyncPhase::Fetching,
            rate_limited: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            imported_ids: Vec::new(),
            affected_dates: None,
            metrics_recomputed: 0,
        }
    }

    pub fn outcome(&self) -> SyncOutcome {
        match self.phase {
            SyncPhase::Failed => SyncOutcome::Failed,
            _ if self.rate_limited => SyncOutcome::RateLimited,
            _ => SyncOutcome::Succeeded,
        }
    }

    /// Widen the affected span to include `date`.
    pub fn touch_date(&mut self, date: NaiveDate) {
        self.affected_dates = Some(match self.affected_dates {
            Some((start, end)) => (start.min(date), end.max(date)),
            None => (date, date),
        });
    }
}

impl Default for SyncReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Answer to "is a sync running and how far has it got".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub running: bool,
    pub lock: Option<LockRecord>,
    pub progress: Option<SyncProgress>,
    pub resume_state: SyncResumeState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_distinguishes_rate_limit_from_failure() {
        let mut report = SyncReport::new();
        report.phase = SyncPhase::Done;
        assert_eq!(report.outcome(), SyncOutcome::Succeeded);

        report.phase = SyncPhase::PausedRateLimit;
        report.rate_limited = true;
        assert_eq!(report.outcome(), SyncOutcome::RateLimited);

        report.phase = SyncPhase::Failed;
        assert_eq!(report.outcome(), SyncOutcome::Failed);
    }

    #[test]
    fn test_touch_date_widens_span() {
        let mut report = SyncReport::new();
        let d = |day| NaiveDate::from_ymd_opt(2026, 1, day).unwrap();
        report.touch_date(d(12));
        report.touch_date(d(3));
        report.touch_date(d(7));
        assert_eq!(report.affected_dates, Some((d(3), d(12))));
    }

    #[test]
    fn test_resume_requires_target() {
        let mut state = SyncResumeState {
            backfill_in_progress: true,
            ..Default::default()
        };
        assert!(!state.should_resume());
        state.target_start_date = NaiveDate::from_ymd_opt(2025, 9, 1);
        assert!(state.should_resume());
        assert_eq!(state.next_page(), 1);
        state.resume_page = Some(3);
        assert_eq!(state.next_page(), 3);
    }

    #[test]
    fn test_phase_serializes_screaming_case() {
        let json = serde_json::to_string(&SyncPhase::PausedRateLimit).unwrap();
        assert_eq!(json, "\"PAUSED_RATE_LIMIT\"");
    }
}
