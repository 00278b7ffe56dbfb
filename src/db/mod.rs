//! Database layer: a versionable file tree under the repository root.

pub mod activities;
pub mod files;

pub use activities::{ActivityIndex, ActivityStore, LoadedActivities};
pub use files::FileDb;

use chrono::NaiveDate;
use std::path::PathBuf;

use crate::time_utils::month_key;

/// Repository-relative locations.
pub mod paths {
    pub const ACTIVITIES_DIR: &str = "data/activities";
    pub const ACTIVITY_INDEX: &str = "data/activities/.index.json";
    pub const DAILY_METRICS_DIR: &str = "data/metrics/daily";
    pub const WEEKLY_METRICS_DIR: &str = "data/metrics/weekly";
    pub const TRAINING_HISTORY: &str = "data/athlete/training_history.yaml";
    pub const ATHLETE_PROFILE: &str = "data/athlete/profile.yaml";
    pub const WORKFLOW_LOCK: &str = "config/.workflow_lock";
    pub const SYNC_PROGRESS: &str = "config/.sync_progress.json";
}

/// `data/activities/YYYY-MM/YYYY-MM-DD_<id>.yaml`
pub fn activity_path(date: NaiveDate, id: &str) -> PathBuf {
    PathBuf::from(paths::ACTIVITIES_DIR)
        .join(month_key(date))
        .join(crate::models::activity::activity_file_name(date, id))
}

/// Glob matching every activity file on one date.
pub fn activities_on_date_pattern(date: NaiveDate) -> String {
    format!(
        "{}/{}/{}_*.yaml",
        paths::ACTIVITIES_DIR,
        month_key(date),
        date.format("%Y-%m-%d")
    )
}

/// Glob matching every activity file.
pub fn all_activities_pattern() -> String {
    format!("{}/*/*.yaml", paths::ACTIVITIES_DIR)
}

/// `data/metrics/daily/YYYY-MM-DD.yaml`
pub fn daily_metrics_path(date: NaiveDate) -> PathBuf {
    PathBuf::from(paths::DAILY_METRICS_DIR).join(format!("{}.yaml", date.format("%Y-%m-%d")))
}

/// `data/metrics/weekly/YYYY-Www.yaml`
pub fn weekly_metrics_path(week_key: &str) -> PathBuf {
    PathBuf::from(paths::WEEKLY_METRICS_DIR).join(format!("{}.yaml", week_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_layout() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();
        assert_eq!(
            activity_path(date, "strava_7"),
            PathBuf::from("data/activities/2026-01/2026-01-12_strava_7.yaml")
        );
        assert_eq!(
            activities_on_date_pattern(date),
            "data/activities/2026-01/2026-01-12_*.yaml"
        );
        assert_eq!(
            daily_metrics_path(date),
            PathBuf::from("data/metrics/daily/2026-01-12.yaml")
        );
    }
}
