// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cooperative, file-based workflow lock.
//!
//! Mutating operations (sync, plan regeneration) serialise on
//! `config/.workflow_lock`. The lock is advisory: it only excludes
//! processes that go through [`LockManager::acquire`].
//!
//! A held lock is reclaimed when it is older than the staleness threshold
//! or its holder process no longer exists.

use chrono::Utc;
use std::time::{Duration, Instant, SystemTime};

use crate::config::Config;
use crate::db::{paths, FileDb};
use crate::error::{AppError, Result};
use crate::models::LockRecord;

/// Polls after which an unparseable lock file is treated as abandoned.
/// Covers the window between a writer creating the file and filling it.
const CORRUPT_GRACE_POLLS: u32 = 20;

/// Acquires and inspects the workflow lock.
#[derive(Debug, Clone)]
pub struct LockManager {
    db: FileDb,
    stale_after: Duration,
    poll_interval: Duration,
}

impl LockManager {
    pub fn new(config: &Config) -> Self {
        Self::with_timing(
            FileDb::new(&config.root),
            config.lock_stale_after,
            config.lock_poll_interval,
        )
    }

    pub fn with_timing(db: FileDb, stale_after: Duration, poll_interval: Duration) -> Self {
        Self {
            db,
            stale_after,
            poll_interval,
        }
    }

    /// Wait up to `timeout` for the lock.
    ///
    /// A zero timeout makes exactly one attempt.
    pub async fn acquire(
        &self,
        operation: &str,
        paths: &[&str],
        timeout: Duration,
    ) -> Result<WorkflowLock> {
        let started = Instant::now();
        let mut last_holder: Option<LockRecord> = None;

        loop {
            match self.db.read_optional::<LockRecord>(paths::WORKFLOW_LOCK) {
                Ok(None) => {
                    let record = LockRecord::new(operation, paths);
                    if self.db.create_new(paths::WORKFLOW_LOCK, &record)? && self.owns(&record)
                    {
                        tracing::info!(operation, pid = record.pid, "Acquired workflow lock");
                        return Ok(WorkflowLock {
                            db: self.db.clone(),
                            record,
                            released: false,
                        });
                    }
                    tracing::debug!(operation, "Lost race for workflow lock");
                }
                Ok(Some(holder)) => {
                    if let Some(reason) = self.stale_reason(&holder) {
                        tracing::warn!(
                            holder_pid = holder.pid,
                            holder_operation = %holder.operation,
                            reason,
                            "Reclaiming stale workflow lock"
                        );
                        self.remove_if_unchanged(&holder)?;
                        continue;
                    }
                    last_holder = Some(holder);
                }
                Err(AppError::Parse { .. }) | Err(AppError::Validation { .. }) => {
                    if self.corrupt_lock_abandoned() {
                        tracing::warn!("Removing unreadable workflow lock");
                        self.db.remove(paths::WORKFLOW_LOCK)?;
                        continue;
                    }
                }
                Err(e) => return Err(e),
            }

            if started.elapsed() >= timeout {
                let holder = last_holder
                    .map(|h| format!("{} (pid {}) since {}", h.operation, h.pid, h.acquired_at))
                    .unwrap_or_else(|| "unknown holder".to_string());
                return Err(AppError::LockTimeout {
                    holder,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Current lock record, without taking the lock.
    pub fn current(&self) -> Result<Option<LockRecord>> {
        match self.db.read_optional::<LockRecord>(paths::WORKFLOW_LOCK) {
            Err(AppError::Parse { .. }) | Err(AppError::Validation { .. }) => Ok(None),
            other => other,
        }
    }

    /// A lock is live while it is young enough and its holder is running.
    pub fn is_live(&self, record: &LockRecord) -> bool {
        self.stale_reason(record).is_none()
    }

    fn stale_reason(&self, record: &LockRecord) -> Option<&'static str> {
        let age = record.age(Utc::now());
        let limit = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        if age > limit {
            Some("expired")
        } else if !pid_is_alive(record.pid) {
            Some("holder_not_running")
        } else {
            None
        }
    }

    /// Re-read after creation; only the record that survives wins.
    fn owns(&self, record: &LockRecord) -> bool {
        matches!(
            self.db.read_optional::<LockRecord>(paths::WORKFLOW_LOCK),
            Ok(Some(current)) if current == *record
        )
    }

    fn remove_if_unchanged(&self, expected: &LockRecord) -> Result<()> {
        if let Some(current) = self.current()? {
            if current == *expected {
                self.db.remove(paths::WORKFLOW_LOCK)?;
            }
        }
        Ok(())
    }

    fn corrupt_lock_abandoned(&self) -> bool {
        let grace = self.poll_interval * CORRUPT_GRACE_POLLS;
        std::fs::metadata(self.db.absolute(paths::WORKFLOW_LOCK))
            .and_then(|m| m.modified())
            .map(|modified| {
                SystemTime::now()
                    .duration_since(modified)
                    .map(|age| age > grace)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

/// A held workflow lock. Released on [`WorkflowLock::release`] or drop.
#[derive(Debug)]
pub struct WorkflowLock {
    db: FileDb,
    record: LockRecord,
    released: bool,
}

impl WorkflowLock {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // Never delete a lock that was reclaimed and re-acquired by someone else.
        match self.db.read_optional::<LockRecord>(paths::WORKFLOW_LOCK) {
            Ok(Some(current)) if current == self.record => {
                self.db.remove(paths::WORKFLOW_LOCK)?;
                tracing::info!(operation = %self.record.operation, "Released workflow lock");
            }
            Ok(_) | Err(AppError::Parse { .. }) | Err(AppError::Validation { .. }) => {
                tracing::warn!(
                    operation = %self.record.operation,
                    "Workflow lock no longer ours at release"
                );
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

impl Drop for WorkflowLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release_inner() {
                tracing::warn!(error = %e, "Failed to release workflow lock on drop");
            }
        }
    }
}

/// Zero-signal probe: the process exists if signalling it would be allowed
/// or is refused for permission reasons.
#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return false,
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A pid far above any real pid_max.
    const DEAD_PID: u32 = 2_147_483_000;

    fn manager(dir: &tempfile::TempDir) -> LockManager {
        LockManager::with_timing(
            FileDb::new(dir.path()),
            Duration::from_secs(300),
            Duration::from_millis(5),
        )
    }

    fn write_lock(dir: &tempfile::TempDir, record: &LockRecord) {
        FileDb::new(dir.path())
            .write(paths::WORKFLOW_LOCK, record)
            .expect("write lock");
    }

    #[tokio::test]
    async fn test_second_acquire_times_out_then_succeeds_after_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let locks = manager(&dir);

        let held = locks
            .acquire("op1", &["data/activities"], Duration::ZERO)
            .await
            .expect("first acquire");

        let started = Instant::now();
        let err = locks
            .acquire("op2", &[], Duration::from_millis(100))
            .await
            .expect_err("second acquire should time out");
        let waited = started.elapsed();
        assert!(matches!(err, AppError::LockTimeout { .. }), "got {:?}", err);
        assert!(err.to_string().contains("op1"));
        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_millis(1_000));

        held.release().expect("release");
        let again = locks
            .acquire("op2", &[], Duration::ZERO)
            .await
            .expect("acquire after release");
        assert_eq!(again.record().operation, "op2");
    }

    #[tokio::test]
    async fn test_lock_file_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _held = manager(&dir)
            .acquire("sync", &["data/activities", "data/metrics"], Duration::ZERO)
            .await
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join(paths::WORKFLOW_LOCK)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["pid"], std::process::id());
        assert_eq!(json["operation"], "sync");
        assert!(json["acquired_at"].is_string());
        assert_eq!(json["paths"][1], "data/metrics");
    }

    #[tokio::test]
    async fn test_expired_lock_is_reclaimed_even_if_holder_alive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut old = LockRecord::new("sync", &[]);
        old.acquired_at = Utc::now() - chrono::Duration::seconds(301);
        write_lock(&dir, &old);

        let locks = manager(&dir);
        assert!(!locks.is_live(&old));
        let lock = locks
            .acquire("plan_regen", &[], Duration::ZERO)
            .await
            .expect("expired lock should be reclaimed");
        assert_eq!(lock.record().operation, "plan_regen");
    }

    #[tokio::test]
    async fn test_dead_holder_is_reclaimed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut orphan = LockRecord::new("sync", &[]);
        orphan.pid = DEAD_PID;
        write_lock(&dir, &orphan);

        let lock = manager(&dir)
            .acquire("sync", &[], Duration::ZERO)
            .await
            .expect("orphaned lock should be reclaimed");
        assert_eq!(lock.record().pid, std::process::id());
    }

    #[tokio::test]
    async fn test_young_lock_with_live_holder_is_respected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_lock(&dir, &LockRecord::new("sync", &[]));

        let locks = manager(&dir);
        let current = locks.current().unwrap().expect("lock present");
        assert!(locks.is_live(&current));
        assert!(locks.acquire("sync", &[], Duration::ZERO).await.is_err());
    }

    #[tokio::test]
    async fn test_unreadable_lock_is_cleared_after_grace() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join(paths::WORKFLOW_LOCK), "{\"pid\":").unwrap();

        let locks = manager(&dir);
        assert!(locks.acquire("sync", &[], Duration::ZERO).await.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;
        locks
            .acquire("sync", &[], Duration::ZERO)
            .await
            .expect("abandoned lock should be cleared");
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let locks = manager(&dir);
        {
            let _lock = locks.acquire("sync", &[], Duration::ZERO).await.unwrap();
            assert!(dir.path().join(paths::WORKFLOW_LOCK).exists());
        }
        assert!(!dir.path().join(paths::WORKFLOW_LOCK).exists());
    }

    #[tokio::test]
    async fn test_release_leaves_foreign_lock_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let locks = manager(&dir);
        let mine = locks.acquire("sync", &[], Duration::ZERO).await.unwrap();

        // Someone reclaimed and re-acquired behind our back
        let theirs = LockRecord::new("plan_regen", &[]);
        write_lock(&dir, &theirs);

        mine.release().unwrap();
        assert_eq!(locks.current().unwrap(), Some(theirs));
    }

    #[test]
    fn test_pid_probe() {
        assert!(pid_is_alive(std::process::id()));
        assert!(!pid_is_alive(DEAD_PID));
        assert!(!pid_is_alive(0));
    }
}
