// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity store: one YAML file per activity plus an id → path manifest.
//!
//! The manifest (`data/activities/.index.json`) lists every stored id, so a
//! lookup that misses it is answered without touching the tree. An entry
//! whose file has gone falls back to a glob scan and repairs the manifest.
//! A missing or corrupt manifest is rebuilt from a full scan of the tree.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::db::{activities_on_date_pattern, activity_path, all_activities_pattern, paths, FileDb};
use crate::error::{AppError, Result};
use crate::models::activity::validate_activity_id;
use crate::models::Activity;

const INDEX_VERSION: u32 = 1;

/// Manifest mapping activity ids to repository-relative paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ActivityIndex {
    pub version: u32,
    pub entries: BTreeMap<String, String>,
}

/// Result of a best-effort bulk load.
#[derive(Debug, Default)]
pub struct LoadedActivities {
    pub activities: Vec<Activity>,
    /// Files that could not be read, with the reason
    pub errors: Vec<(PathBuf, AppError)>,
}

/// Typed access to `data/activities/`.
#[derive(Debug, Clone)]
pub struct ActivityStore {
    db: FileDb,
}

impl ActivityStore {
    pub fn new(db: FileDb) -> Self {
        Self { db }
    }

    /// Persist an activity atomically and record it in the manifest.
    ///
    /// Replaces any existing file for the same date and id.
    pub fn save(&self, activity: &Activity) -> Result<PathBuf> {
        let rel = activity_path(activity.date, &activity.id);
        self.db.write(&rel, activity)?;

        // A manifest without this id would hide it; drop it so the next
        // lookup rebuilds from the tree.
        if let Err(e) = self.record_in_index(&activity.id, &rel) {
            tracing::warn!(id = %activity.id, error = %e, "Failed to update activity index");
            if let Err(e) = self.db.remove(paths::ACTIVITY_INDEX) {
                tracing::warn!(error = %e, "Failed to drop activity index");
            }
        }
        Ok(rel)
    }

    pub fn load(&self, rel: impl AsRef<Path>) -> Result<Activity> {
        self.db.read(rel)
    }

    /// Path of the activity with this id, if it exists on disk.
    pub fn find_by_id(&self, id: &str) -> Result<Option<PathBuf>> {
        if validate_activity_id(id).is_err() {
            return Ok(None);
        }

        let index = self.load_index()?;
        let Some(rel) = index.entries.get(id) else {
            return Ok(None);
        };
        if self.db.exists(rel) {
            return Ok(Some(PathBuf::from(rel)));
        }
        tracing::debug!(id, path = %rel, "Index entry is stale, scanning");

        let pattern = format!("{}/*/*_{}.yaml", paths::ACTIVITIES_DIR, id);
        let hit = self
            .db
            .list(&pattern)?
            .into_iter()
            .find(|rel| id_from_path(rel).as_deref() == Some(id));

        let repaired = match &hit {
            Some(rel) => self.record_in_index(id, rel),
            None => self.forget_in_index(id),
        };
        if let Err(e) = repaired {
            tracing::warn!(id, error = %e, "Failed to repair activity index");
        }
        Ok(hit)
    }

    /// All activities starting on `date`. Malformed files are reported, not fatal.
    pub fn list_on_date(&self, date: NaiveDate) -> Result<LoadedActivities> {
        let paths = self.db.list(&activities_on_date_pattern(date))?;
        Ok(self.load_paths(paths))
    }

    /// Every activity in the store, ordered by path (date, then id).
    pub fn load_all(&self) -> Result<LoadedActivities> {
        let paths = self.db.list(&all_activities_pattern())?;
        Ok(self.load_paths(paths))
    }

    /// Rebuild the manifest from a scan of the activity tree.
    pub fn rebuild_index(&self) -> Result<ActivityIndex> {
        let mut index = ActivityIndex {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
        };
        for rel in self.db.list(&all_activities_pattern())? {
            if let Some(id) = id_from_path(&rel) {
                index.entries.insert(id, path_string(&rel));
            }
        }
        self.db.write(paths::ACTIVITY_INDEX, &index)?;
        tracing::info!(entries = index.entries.len(), "Rebuilt activity index");
        Ok(index)
    }

    fn load_paths(&self, paths: Vec<PathBuf>) -> LoadedActivities {
        let mut loaded = LoadedActivities::default();
        for rel in paths {
            match self.db.read::<Activity>(&rel) {
                Ok(activity) => loaded.activities.push(activity),
                Err(e) => {
                    tracing::warn!(path = %rel.display(), error = %e, "Skipping unreadable activity");
                    loaded.errors.push((rel, e));
                }
            }
        }
        loaded
    }

    fn load_index(&self) -> Result<ActivityIndex> {
        match self.db.read_optional::<ActivityIndex>(paths::ACTIVITY_INDEX) {
            Ok(Some(index)) if index.version == INDEX_VERSION => Ok(index),
            Ok(Some(_)) | Ok(None) => self.rebuild_index(),
            Err(e @ AppError::Parse { .. }) | Err(e @ AppError::Validation { .. }) => {
                tracing::warn!(error = %e, "Activity index unreadable, rebuilding");
                self.rebuild_index()
            }
            Err(e) => Err(e),
        }
    }

    fn record_in_index(&self, id: &str, rel: &Path) -> Result<()> {
        let mut index = self.load_index()?;
        let value = path_string(rel);
        if index.entries.get(id) != Some(&value) {
            index.entries.insert(id.to_string(), value);
            self.db.write(paths::ACTIVITY_INDEX, &index)?;
        }
        Ok(())
    }

    fn forget_in_index(&self, id: &str) -> Result<()> {
        let mut index = self.load_index()?;
        if index.entries.remove(id).is_some() {
            self.db.write(paths::ACTIVITY_INDEX, &index)?;
        }
        Ok(())
    }
}

/// Id encoded in `YYYY-MM-DD_<id>.yaml`.
fn id_from_path(rel: &Path) -> Option<String> {
    let name = rel.file_name()?.to_str()?;
    let stem = name.strip_suffix(".yaml")?;
    let (date, id) = (stem.get(..10)?, stem.get(11..)?);
    if stem.as_bytes().get(10) != Some(&b'_') || id.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(id.to_string())
}

fn path_string(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActivityOrigin, DataQuality, LoadCalculation, RpeSource, SportType,
    };
    use chrono::{NaiveDateTime, TimeZone, Utc};

    fn activity(id: &str, start: &str) -> Activity {
        let start = NaiveDateTime::parse_from_str(start, "%Y-%m-%dT%H:%M").unwrap();
        Activity {
            id: id.to_string(),
            origin: ActivityOrigin::Manual,
            external_id: None,
            name: "Easy run".to_string(),
            date: start.date(),
            start_time: start,
            sport: SportType::Run,
            duration_secs: 3600,
            distance_m: Some(10_000.0),
            elevation_gain_m: None,
            average_hr: None,
            max_hr: None,
            perceived_exertion: Some(4),
            quality: DataQuality::default(),
            notes: None,
            load: LoadCalculation {
                rpe: 4,
                rpe_source: RpeSource::Reported,
                duration_minutes: 60.0,
                base_effort: 240.0,
                systemic_multiplier: 1.0,
                lower_body_multiplier: 1.0,
                systemic_load: 240.0,
                lower_body_load: 240.0,
            },
            ingested_at: Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 0).unwrap(),
        }
    }

    fn store() -> (tempfile::TempDir, ActivityStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ActivityStore::new(FileDb::new(dir.path()));
        (dir, store)
    }

    #[test]
    fn test_save_uses_layout_and_indexes() {
        let (dir, store) = store();
        let rel = store.save(&activity("manual_a", "2026-01-12T07:00")).unwrap();

        assert_eq!(
            rel,
            PathBuf::from("data/activities/2026-01/2026-01-12_manual_a.yaml")
        );
        assert!(dir.path().join(&rel).is_file());
        assert_eq!(store.find_by_id("manual_a").unwrap(), Some(rel));
        assert_eq!(store.find_by_id("manual_b").unwrap(), None);
    }

    #[test]
    fn test_find_by_id_survives_lost_index() {
        let (dir, store) = store();
        store.save(&activity("strava_1", "2026-01-10T06:00")).unwrap();
        store.save(&activity("strava_2", "2026-02-01T06:00")).unwrap();

        std::fs::remove_file(dir.path().join(paths::ACTIVITY_INDEX)).unwrap();
        assert!(store.find_by_id("strava_2").unwrap().is_some());

        std::fs::write(dir.path().join(paths::ACTIVITY_INDEX), "{not json").unwrap();
        assert!(store.find_by_id("strava_1").unwrap().is_some());
        let index: ActivityIndex = FileDb::new(dir.path())
            .read(paths::ACTIVITY_INDEX)
            .unwrap();
        assert_eq!(index.entries.len(), 2);
    }

    #[test]
    fn test_index_miss_is_absent_without_scanning() {
        let (dir, store) = store();
        store.save(&activity("strava_1", "2026-01-10T06:00")).unwrap();

        // A file the manifest never heard of stays invisible until a rebuild.
        let db = FileDb::new(dir.path());
        let stray = activity("strava_2", "2026-01-11T06:00");
        db.write("data/activities/2026-01/2026-01-11_strava_2.yaml", &stray)
            .unwrap();
        assert_eq!(store.find_by_id("strava_2").unwrap(), None);

        store.rebuild_index().unwrap();
        assert_eq!(
            store.find_by_id("strava_2").unwrap(),
            Some(PathBuf::from("data/activities/2026-01/2026-01-11_strava_2.yaml"))
        );
    }

    #[test]
    fn test_stale_index_entry_is_pruned() {
        let (dir, store) = store();
        let rel = store.save(&activity("strava_9", "2026-01-10T06:00")).unwrap();
        std::fs::remove_file(dir.path().join(rel)).unwrap();

        assert_eq!(store.find_by_id("strava_9").unwrap(), None);
        let index: ActivityIndex = FileDb::new(dir.path())
            .read(paths::ACTIVITY_INDEX)
            .unwrap();
        assert!(!index.entries.contains_key("strava_9"));
    }

    #[test]
    fn test_similar_ids_do_not_collide() {
        let (_dir, store) = store();
        store.save(&activity("x_strava_1", "2026-01-10T06:00")).unwrap();
        assert_eq!(store.find_by_id("strava_1").unwrap(), None);
    }

    #[test]
    fn test_list_on_date_reports_malformed_files() {
        let (dir, store) = store();
        store.save(&activity("manual_ok", "2026-01-12T07:00")).unwrap();
        store.save(&activity("manual_other_day", "2026-01-13T07:00")).unwrap();
        std::fs::write(
            dir.path()
                .join("data/activities/2026-01/2026-01-12_manual_broken.yaml"),
            "id: [",
        )
        .unwrap();

        let loaded = store.list_on_date(chrono::NaiveDate::from_ymd_opt(2026, 1, 12).unwrap()).unwrap();
        assert_eq!(loaded.activities.len(), 1);
        assert_eq!(loaded.activities[0].id, "manual_ok");
        assert_eq!(loaded.errors.len(), 1);

        assert_eq!(store.load_all().unwrap().activities.len(), 2);
    }

    #[test]
    fn test_id_from_path() {
        assert_eq!(
            id_from_path(Path::new("data/activities/2026-01/2026-01-12_strava_5.yaml")),
            Some("strava_5".to_string())
        );
        assert_eq!(id_from_path(Path::new("2026-01-12.yaml")), None);
        assert_eq!(id_from_path(Path::new("notadate__x.yaml")), None);
    }
}
