//! Upstream activity → stored activity record.

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::db::activity_path;
use crate::error::{AppError, Result};
use crate::models::{Activity, ActivityOrigin, DataQuality, RawActivity, SportType};
use crate::services::LoadCalculator;

/// Provenance prefix for ids of activities pulled from Strava.
pub const STRAVA_ID_PREFIX: &str = "strava_";

pub fn strava_activity_id(external_id: &str) -> String {
    format!("{}{}", STRAVA_ID_PREFIX, external_id)
}

/// Build a validated activity record, including its load calculation.
pub fn normalize(
    raw: &RawActivity,
    calculator: &LoadCalculator,
    now: DateTime<Utc>,
) -> Result<Activity> {
    let id = strava_activity_id(raw.external_id.trim());
    let date = raw.start_local.date();

    // Moving time excludes stops; fall back to elapsed for manual entries.
    let duration_secs = raw
        .moving_secs
        .filter(|s| *s > 0)
        .unwrap_or(raw.elapsed_secs);

    let sport = SportType::from_strava(&raw.sport_type);
    let average_hr = raw.average_hr.and_then(heart_rate);
    let max_hr = raw.max_hr.and_then(heart_rate);
    let perceived_exertion = raw
        .perceived_exertion
        .map(f64::round)
        .filter(|r| (1.0..=10.0).contains(r))
        .map(|r| r as u8);
    let distance_m = raw.distance_m.filter(|d| *d > 0.0);

    let name = match raw.name.trim() {
        "" => sport.as_str().replace('_', " "),
        name => name.to_string(),
    };
    let notes = raw
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let activity = Activity {
        id,
        origin: ActivityOrigin::Strava,
        external_id: Some(raw.external_id.trim().to_string()),
        name,
        date,
        start_time: raw.start_local,
        sport,
        duration_secs,
        distance_m,
        elevation_gain_m: raw.elevation_gain_m,
        average_hr,
        max_hr,
        perceived_exertion,
        quality: DataQuality {
            has_heart_rate: average_hr.is_some(),
            has_distance: distance_m.is_some(),
            manual_entry: raw.manual,
        },
        notes,
        load: calculator.calculate(sport, duration_secs, perceived_exertion, average_hr),
        ingested_at: now,
    };

    activity
        .validate()
        .map_err(|e| AppError::validation(&activity_path(date, &activity.id), e))?;
    Ok(activity)
}

/// Plausible heart rates only; sensor dropouts report 0 or nonsense.
fn heart_rate(bpm: f64) -> Option<u16> {
    let bpm = bpm.round();
    (30.0..=250.0).contains(&bpm).then_some(bpm as u16)
}
