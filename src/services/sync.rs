// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Resumable activity sync.
//!
//! Workflow:
//! 1. Take the workflow lock (fail fast if another sync holds it)
//! 2. Pick the fetch window: the interrupted window at its resume page,
//!    explicit `since`, incremental from the last sync, or the first-time
//!    lookback
//! 3. Stream the window page by page; for each activity check for
//!    duplicates, normalize, compute load and persist before touching the
//!    next
//! 4. Checkpoint after every handled activity. The resume page advances
//!    only when a whole page has been handled, so the order the source
//!    returns activities in never matters
//! 5. Best-effort: refresh the athlete profile, recompute metrics over the
//!    affected dates
//! 6. Persist resume state and release the lock
//!
//! Phases: `FETCHING → PROCESSING → METRICS → DONE`, or
//! `PAUSED_RATE_LIMIT` / `FAILED` when the stream ends early.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use futures_util::StreamExt;

use crate::config::{Config, INCREMENTAL_OVERLAP_HOURS};
use crate::db::{paths, ActivityStore, FileDb};
use crate::error::{AppError, Result};
use crate::lock::LockManager;
use crate::models::{
    RawActivity, SyncPhase, SyncProgress, SyncReport, SyncResumeState, SyncStatus,
    TrainingHistory,
};
use crate::services::dedup::{Duplicate, DuplicateDetector};
use crate::services::metrics::MetricsEngine;
use crate::services::normalize::{normalize, strava_activity_id};
use crate::services::source::{ActivitySource, FetchWindow, SourceEvent};
use crate::services::status::sync_status;
use crate::services::LoadCalculator;

/// Lock operation name for sync runs.
pub const SYNC_OPERATION: &str = "sync";

/// Repository areas a sync writes to.
const SYNC_PATHS: &[&str] = &["data/activities", "data/metrics", "data/athlete"];

/// What happened to one streamed activity.
enum ItemOutcome {
    Imported { id: String, date: NaiveDate },
    Skipped,
    Failed(String),
}

/// Mutable state of one run.
struct SyncRun {
    report: SyncReport,
    progress: SyncProgress,
    history: TrainingHistory,
    started_at: DateTime<Utc>,
}

/// Pulls activities from a source into the repository.
pub struct SyncPipeline<S> {
    config: Config,
    db: FileDb,
    store: ActivityStore,
    locks: LockManager,
    detector: DuplicateDetector,
    calculator: LoadCalculator,
    metrics: MetricsEngine,
    source: S,
    today: Option<NaiveDate>,
}

impl<S: ActivitySource> SyncPipeline<S> {
    pub fn new(config: Config, source: S) -> Self {
        let db = FileDb::new(&config.root);
        let store = ActivityStore::new(db.clone());
        Self {
            locks: LockManager::new(&config),
            detector: DuplicateDetector::new(store.clone(), config.dedup.clone()),
            calculator: LoadCalculator::new(config.load.clone()),
            metrics: MetricsEngine::new(db.clone()),
            db,
            store,
            source,
            today: None,
            config,
        }
    }

    /// Fix the date used for the lookback window and the metrics horizon.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn store(&self) -> &ActivityStore {
        &self.store
    }

    pub fn status(&self) -> Result<SyncStatus> {
        sync_status(&self.config)
    }

    /// Run one sync.
    ///
    /// Returns `Err` only when the run could not start (lock contention,
    /// unreadable sync history). Everything after that is reported in the
    /// returned [`SyncReport`].
    pub async fn sync(&self, since: Option<DateTime<Utc>>) -> Result<SyncReport> {
        let lock = self
            .locks
            .acquire(SYNC_OPERATION, SYNC_PATHS, self.config.lock_timeout)
            .await?;

        let history: TrainingHistory = self
            .db
            .read_optional(paths::TRAINING_HISTORY)?
            .unwrap_or_default();

        let started_at = Utc::now();
        let mut run = SyncRun {
            report: SyncReport::new(),
            progress: SyncProgress {
                pid: std::process::id(),
                phase: SyncPhase::Fetching,
                seen: 0,
                imported: 0,
                skipped: 0,
                failed: 0,
                page: None,
                started_at,
                updated_at: started_at,
            },
            history,
            started_at,
        };

        self.run(&mut run, since).await;

        if let Err(e) = lock.release() {
            tracing::warn!(error = %e, "Failed to release workflow lock");
            run.report.warnings.push(format!("lock release: {}", e));
        }

        let report = run.report;
        tracing::info!(
            imported = report.imported,
            skipped = report.skipped,
            failed = report.failed,
            phase = ?report.phase,
            outcome = ?report.outcome(),
            "Sync finished"
        );
        Ok(report)
    }

    async fn run(&self, run: &mut SyncRun, since: Option<DateTime<Utc>>) {
        let (window, first_page) = self.open_window(run, since);
        tracing::info!(
            after = %window.after,
            before = ?window.before,
            page = first_page,
            "Starting sync"
        );

        if let Err(e) = self.save_history(run) {
            self.fail(run, format!("checkpoint: {}", e));
        } else {
            self.set_phase(run, SyncPhase::Fetching);
            self.stream(run, window, first_page).await;
        }

        let drained = !run.report.phase.is_terminal();
        if drained {
            let sync = &mut run.history.sync;
            let opened_at = sync
                .resume_before_timestamp
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .unwrap_or(run.started_at);
            run.history.last_sync_at = Some(opened_at);
            *sync = SyncResumeState {
                last_progress_at: sync.last_progress_at,
                ..SyncResumeState::default()
            };
        }

        self.refresh_profile(run).await;
        self.recompute_metrics(run);

        if !run.report.phase.is_terminal() {
            self.set_phase(run, SyncPhase::Done);
        }

        run.history.last_outcome = Some(run.report.outcome());
        run.history.sync.last_progress_at = Some(Utc::now());
        if let Err(e) = self.save_history(run) {
            tracing::error!(error = %e, "Failed to persist sync history");
            run.report.errors.push(format!("sync history: {}", e));
        }
    }

    /// Choose the window and first page, and record them in the resume state.
    fn open_window(&self, run: &mut SyncRun, since: Option<DateTime<Utc>>) -> (FetchWindow, u32) {
        let sync = &mut run.history.sync;
        if sync.should_resume() {
            if let Some(target) = sync.target_start_date {
                let after = sync
                    .resume_after_timestamp
                    .and_then(|ts| DateTime::from_timestamp(ts, 0))
                    .unwrap_or_else(|| start_of_day(target));
                let before = sync
                    .resume_before_timestamp
                    .and_then(|ts| DateTime::from_timestamp(ts, 0));
                let page = sync.next_page();
                run.progress.page = Some(page);
                return (FetchWindow { after, before }, page);
            }
        }

        let after = match (since, run.history.last_sync_at) {
            (Some(since), _) => since,
            (None, Some(last)) => last - Duration::hours(INCREMENTAL_OVERLAP_HOURS),
            (None, None) => start_of_day(self.today() - Duration::days(self.config.lookback_days)),
        };
        let before = run.started_at.timestamp();

        sync.backfill_in_progress = true;
        sync.target_start_date = Some(after.date_naive());
        sync.resume_after_timestamp = Some(after.timestamp());
        sync.resume_before_timestamp = Some(before);
        sync.resume_page = Some(1);
        run.progress.page = Some(1);

        let window = FetchWindow {
            after,
            before: DateTime::from_timestamp(before, 0),
        };
        (window, 1)
    }

    async fn stream(&self, run: &mut SyncRun, window: FetchWindow, first_page: u32) {
        let mut events = self.source.activities(window, first_page);

        while let Some(event) = events.next().await {
            if run.report.phase == SyncPhase::Fetching {
                self.set_phase(run, SyncPhase::Processing);
            }

            let raw = match event {
                Ok(SourceEvent::Activity(raw)) => raw,
                Ok(SourceEvent::PageDone { page }) => {
                    tracing::debug!(page, "Page handled");
                    run.history.sync.resume_page = Some(page + 1);
                    run.progress.page = Some(page + 1);
                    if let Err(e) = self.checkpoint(run) {
                        self.fail(run, format!("checkpoint: {}", e));
                        return;
                    }
                    continue;
                }
                Err(e) if e.is_rate_limited() => {
                    tracing::warn!(error = %e, "Rate limited; pausing sync");
                    run.report.rate_limited = true;
                    self.set_phase(run, SyncPhase::PausedRateLimit);
                    return;
                }
                Err(e) if e.is_upstream() => {
                    self.fail(run, e.to_string());
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable upstream activity");
                    run.progress.seen += 1;
                    run.report.failed += 1;
                    run.report.errors.push(e.to_string());
                    self.write_progress(run);
                    continue;
                }
            };
            run.progress.seen += 1;

            match self.handle(&raw) {
                Ok(ItemOutcome::Imported { id, date }) => {
                    run.report.imported += 1;
                    run.report.imported_ids.push(id);
                    run.report.touch_date(date);
                    run.history.activities_imported += 1;
                    run.history.earliest_activity_date = Some(
                        run.history
                            .earliest_activity_date
                            .map_or(date, |earliest| earliest.min(date)),
                    );
                }
                Ok(ItemOutcome::Skipped) => run.report.skipped += 1,
                Ok(ItemOutcome::Failed(message)) => {
                    run.report.failed += 1;
                    run.report.errors.push(message);
                }
                Err(e) => {
                    // Storage fault: the page stays open, a resume refetches it.
                    self.fail(run, format!("{}: {}", raw.external_id, e));
                    return;
                }
            }

            if let Err(e) = self.checkpoint(run) {
                self.fail(run, format!("checkpoint: {}", e));
                return;
            }
        }
    }

    /// Persist resume state and the progress heartbeat.
    fn checkpoint(&self, run: &mut SyncRun) -> Result<()> {
        run.history.sync.last_progress_at = Some(Utc::now());
        self.save_history(run)?;
        self.write_progress(run);
        Ok(())
    }

    /// Persist one activity unless it is already on disk.
    ///
    /// `Err` means the repository itself failed; per-activity problems come
    /// back as [`ItemOutcome::Failed`].
    fn handle(&self, raw: &RawActivity) -> Result<ItemOutcome> {
        let id = strava_activity_id(raw.external_id.trim());

        if let Some(Duplicate::Exact(path)) = self.detector.exact(&id)? {
            tracing::debug!(activity_id = %id, path = %path.display(), "Already imported");
            return Ok(ItemOutcome::Skipped);
        }

        let activity = match normalize(raw, &self.calculator, Utc::now()) {
            Ok(activity) => activity,
            Err(e @ AppError::Validation { .. }) | Err(e @ AppError::Parse { .. }) => {
                tracing::warn!(activity_id = %id, error = %e, "Rejected activity");
                return Ok(ItemOutcome::Failed(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        if let Some(Duplicate::Fuzzy { existing_id }) = self.detector.fuzzy(&activity)? {
            tracing::info!(
                activity_id = %id,
                existing_id = %existing_id,
                "Same session already recorded"
            );
            return Ok(ItemOutcome::Skipped);
        }

        self.store.save(&activity)?;
        tracing::info!(
            activity_id = %activity.id,
            date = %activity.date,
            sport = activity.sport.as_str(),
            systemic_load = activity.load.systemic_load,
            "Imported activity"
        );
        Ok(ItemOutcome::Imported {
            id: activity.id,
            date: activity.date,
        })
    }

    async fn refresh_profile(&self, run: &mut SyncRun) {
        let result = match self.source.fetch_profile().await {
            Ok(profile) => self.db.write(paths::ATHLETE_PROFILE, &profile),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Athlete profile refresh failed");
            run.report.warnings.push(format!("profile refresh: {}", e));
        }
    }

    fn recompute_metrics(&self, run: &mut SyncRun) {
        let Some((first, last)) = run.report.affected_dates else {
            return;
        };
        if !run.report.phase.is_terminal() {
            self.set_phase(run, SyncPhase::Metrics);
        }

        let end = self.today().max(last);
        match self.metrics.compute_metrics_batch(first, end) {
            Ok(days) => run.report.metrics_recomputed = days.len() as u32,
            Err(e) => {
                tracing::warn!(error = %e, "Metrics recompute failed");
                run.report.warnings.push(format!("metrics recompute: {}", e));
            }
        }
    }

    fn fail(&self, run: &mut SyncRun, message: String) {
        tracing::error!(error = %message, "Sync failed");
        run.report.errors.push(message);
        self.set_phase(run, SyncPhase::Failed);
    }

    fn set_phase(&self, run: &mut SyncRun, phase: SyncPhase) {
        tracing::debug!(from = ?run.report.phase, to = ?phase, "Sync phase");
        run.report.phase = phase;
        run.progress.phase = phase;
        self.write_progress(run);
    }

    /// Heartbeat for status readers. Losing one is harmless.
    fn write_progress(&self, run: &mut SyncRun) {
        run.progress.imported = run.report.imported;
        run.progress.skipped = run.report.skipped;
        run.progress.failed = run.report.failed;
        run.progress.updated_at = Utc::now();
        if let Err(e) = self.db.write(paths::SYNC_PROGRESS, &run.progress) {
            tracing::warn!(error = %e, "Failed to write sync progress");
        }
    }

    fn save_history(&self, run: &SyncRun) -> Result<()> {
        self.db.write(paths::TRAINING_HISTORY, &run.history)
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
