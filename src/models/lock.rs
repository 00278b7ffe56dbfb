//! Lock record persisted at `config/.workflow_lock`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LockRecord {
    pub pid: u32,
    /// Human-readable operation name ("sync", "plan_regen", ...)
    #[validate(length(min = 1))]
    pub operation: String,
    pub acquired_at: DateTime<Utc>,
    /// Paths the holder intends to touch (informational)
    #[serde(default)]
    pub paths: Vec<String>,
}

impl LockRecord {
    pub fn new(operation: &str, paths: &[&str]) -> Self {
        Self {
            pid: std::process::id(),
            operation: operation.to_string(),
            acquired_at: Utc::now(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.acquired_at)
    }
}
