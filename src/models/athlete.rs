//! Athlete profile snapshot refreshed from the upstream service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Profile snapshot stored in `data/athlete/profile.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AthleteProfile {
    /// Strava athlete ID
    pub athlete_id: u64,
    pub firstname: String,
    pub lastname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_watts: Option<u32>,
    pub fetched_at: DateTime<Utc>,
}
