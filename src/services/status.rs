//! Read-only sync status. Never takes the workflow lock.

use crate::config::Config;
use crate::db::{paths, FileDb};
use crate::error::{AppError, Result};
use crate::lock::LockManager;
use crate::models::{SyncProgress, SyncStatus, TrainingHistory};

/// Lock, progress heartbeat and resume state as currently on disk.
///
/// `running` is true only while the lock is held by a live process; a
/// stale lock is reported but not counted as running. Unreadable progress
/// or history files are reported as absent.
pub fn sync_status(config: &Config) -> Result<SyncStatus> {
    let db = FileDb::new(&config.root);
    let locks = LockManager::new(config);

    let lock = locks.current()?;
    let running = lock.as_ref().is_some_and(|record| locks.is_live(record));

    let progress = tolerate_corrupt(db.read_optional::<SyncProgress>(paths::SYNC_PROGRESS))?;
    let history = tolerate_corrupt(db.read_optional::<TrainingHistory>(paths::TRAINING_HISTORY))?;

    Ok(SyncStatus {
        running,
        lock,
        progress,
        resume_state: history.map(|h| h.sync).unwrap_or_default(),
    })
}

fn tolerate_corrupt<T>(result: Result<Option<T>>) -> Result<Option<T>> {
    match result {
        Err(e @ AppError::Parse { .. }) | Err(e @ AppError::Validation { .. }) => {
            tracing::warn!(error = %e, "Ignoring unreadable status file");
            Ok(None)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LockRecord, SyncPhase, SyncResumeState};
    use chrono::{NaiveDate, Utc};

    #[test]
    fn test_empty_repository() {
        let dir = tempfile::tempdir().expect("tempdir");
        let status = sync_status(&Config::for_root(dir.path())).unwrap();
        assert!(!status.running);
        assert_eq!(status.lock, None);
        assert_eq!(status.progress, None);
        assert_eq!(status.resume_state, SyncResumeState::default());
    }

    #[test]
    fn test_live_lock_and_progress() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = FileDb::new(dir.path());
        let record = LockRecord::new("sync", &["data/activities"]);
        db.write(paths::WORKFLOW_LOCK, &record).unwrap();
        let now = Utc::now();
        db.write(
            paths::SYNC_PROGRESS,
            &SyncProgress {
                pid: record.pid,
                phase: SyncPhase::Processing,
                seen: 3,
                imported: 2,
                skipped: 1,
                failed: 0,
                page: Some(2),
                started_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        let history = TrainingHistory {
            sync: SyncResumeState {
                backfill_in_progress: true,
                target_start_date: NaiveDate::from_ymd_opt(2025, 9, 1),
                resume_before_timestamp: Some(1_768_201_200),
                resume_page: Some(2),
                ..Default::default()
            },
            ..Default::default()
        };
        db.write(paths::TRAINING_HISTORY, &history).unwrap();

        let status = sync_status(&Config::for_root(dir.path())).unwrap();
        assert!(status.running);
        assert_eq!(status.lock, Some(record));
        assert_eq!(status.progress.unwrap().imported, 2);
        assert!(status.resume_state.should_resume());
    }

    #[test]
    fn test_corrupt_progress_reads_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join(paths::SYNC_PROGRESS), "{\"pid\":").unwrap();

        let status = sync_status(&Config::for_root(dir.path())).unwrap();
        assert_eq!(status.progress, None);
    }
}
