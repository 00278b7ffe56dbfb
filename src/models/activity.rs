// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity records as stored under `data/activities/`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Closed set of sports the load model knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SportType {
    Run,
    TrailRun,
    Cycle,
    Swim,
    Row,
    Climb,
    Ski,
    Hike,
    Walk,
    Strength,
    Crossfit,
    Yoga,
    Other,
}

impl SportType {
    /// Map a Strava `sport_type` string onto the closed enumeration.
    pub fn from_strava(sport_type: &str) -> Self {
        match sport_type {
            "Run" | "VirtualRun" => SportType::Run,
            "TrailRun" => SportType::TrailRun,
            "Ride" | "VirtualRide" | "MountainBikeRide" | "GravelRide" | "EBikeRide"
            | "EMountainBikeRide" | "Velomobile" | "Handcycle" => SportType::Cycle,
            "Swim" => SportType::Swim,
            "Rowing" | "VirtualRow" | "Canoeing" | "Kayaking" => SportType::Row,
            "RockClimbing" => SportType::Climb,
            "AlpineSki" | "BackcountrySki" | "NordicSki" | "Snowboard" => SportType::Ski,
            "Hike" | "Snowshoe" => SportType::Hike,
            "Walk" => SportType::Walk,
            "WeightTraining" => SportType::Strength,
            "Crossfit" | "HighIntensityIntervalTraining" => SportType::Crossfit,
            "Yoga" | "Pilates" => SportType::Yoga,
            _ => SportType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SportType::Run => "run",
            SportType::TrailRun => "trail_run",
            SportType::Cycle => "cycle",
            SportType::Swim => "swim",
            SportType::Row => "row",
            SportType::Climb => "climb",
            SportType::Ski => "ski",
            SportType::Hike => "hike",
            SportType::Walk => "walk",
            SportType::Strength => "strength",
            SportType::Crossfit => "crossfit",
            SportType::Yoga => "yoga",
            SportType::Other => "other",
        }
    }

    /// Built-in (systemic, lower-body) multipliers.
    ///
    /// Running is the reference sport. Other sports load the whole system
    /// to varying degrees but spare the legs, so they count toward fatigue
    /// without inflating running-specific volume.
    pub fn default_multiplier(&self) -> SportMultiplier {
        let (systemic, lower_body) = match self {
            SportType::Run => (1.00, 1.00),
            SportType::TrailRun => (1.05, 1.10),
            SportType::Cycle => (0.85, 0.35),
            SportType::Swim => (0.70, 0.10),
            SportType::Row => (0.90, 0.25),
            SportType::Climb => (0.60, 0.10),
            SportType::Ski => (0.85, 0.60),
            SportType::Hike => (0.60, 0.50),
            SportType::Walk => (0.35, 0.25),
            SportType::Strength => (0.55, 0.40),
            SportType::Crossfit => (0.75, 0.55),
            SportType::Yoga => (0.30, 0.05),
            SportType::Other => (0.70, 0.30),
        };
        SportMultiplier {
            systemic,
            lower_body,
        }
    }
}

/// Load multipliers for one sport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SportMultiplier {
    pub systemic: f64,
    pub lower_body: f64,
}

/// Where an activity record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityOrigin {
    Strava,
    Manual,
}

/// How the RPE used for the load was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpeSource {
    Reported,
    HeartRate,
    Default,
}

/// Data-quality flags carried with each activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataQuality {
    pub has_heart_rate: bool,
    pub has_distance: bool,
    /// Entered by hand on the upstream service (no device recording)
    pub manual_entry: bool,
}

/// Training load derived from a single activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LoadCalculation {
    #[validate(range(min = 1, max = 10))]
    pub rpe: u8,
    pub rpe_source: RpeSource,
    #[validate(range(min = 0.0))]
    pub duration_minutes: f64,
    /// RPE × duration in minutes
    #[validate(range(min = 0.0))]
    pub base_effort: f64,
    #[validate(range(min = 0.0))]
    pub systemic_multiplier: f64,
    #[validate(range(min = 0.0))]
    pub lower_body_multiplier: f64,
    #[validate(range(min = 0.0))]
    pub systemic_load: f64,
    #[validate(range(min = 0.0))]
    pub lower_body_load: f64,
}

/// Stored activity record, one YAML file per activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_activity_dates"))]
pub struct Activity {
    /// Stable id with a provenance prefix (`strava_123`, `manual_...`)
    #[validate(custom(function = "validate_activity_id"))]
    pub id: String,
    pub origin: ActivityOrigin,
    /// Upstream identifier, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub name: String,
    /// Local calendar date of the start
    pub date: NaiveDate,
    /// Local wall-clock start time
    pub start_time: NaiveDateTime,
    pub sport: SportType,
    #[validate(range(min = 1))]
    pub duration_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub distance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_gain_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 30, max = 250))]
    pub average_hr: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 30, max = 250))]
    pub max_hr: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 10))]
    pub perceived_exertion: Option<u8>,
    #[serde(default)]
    pub quality: DataQuality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[validate(nested)]
    pub load: LoadCalculation,
    pub ingested_at: DateTime<Utc>,
}

impl Activity {
    /// Deterministic file name: `YYYY-MM-DD_<id>.yaml`.
    pub fn file_name(&self) -> String {
        activity_file_name(self.date, &self.id)
    }
}

pub fn activity_file_name(date: NaiveDate, id: &str) -> String {
    format!("{}_{}.yaml", date.format("%Y-%m-%d"), id)
}

/// Ids end up in file names, so keep them to a safe alphabet.
pub fn validate_activity_id(id: &str) -> Result<(), ValidationError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("activity_id"))
    }
}

fn validate_activity_dates(activity: &Activity) -> Result<(), ValidationError> {
    if activity.start_time.date() == activity.date {
        Ok(())
    } else {
        Err(ValidationError::new("date_mismatch"))
    }
}

/// An activity as yielded by an upstream source, before normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawActivity {
    /// Upstream id, unique within the source
    pub external_id: String,
    pub name: String,
    /// Upstream sport name (Strava `sport_type`)
    pub sport_type: String,
    /// Start time in the athlete's local time zone
    pub start_local: NaiveDateTime,
    /// Absolute start time, used as the pagination cursor
    pub start_utc: DateTime<Utc>,
    pub elapsed_secs: u32,
    #[serde(default)]
    pub moving_secs: Option<u32>,
    #[serde(default)]
    pub distance_m: Option<f64>,
    #[serde(default)]
    pub elevation_gain_m: Option<f64>,
    #[serde(default)]
    pub average_hr: Option<f64>,
    #[serde(default)]
    pub max_hr: Option<f64>,
    #[serde(default)]
    pub perceived_exertion: Option<f64>,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub description: Option<String>,
}
