//! Daily and weekly training-metric records.
//!
//! Daily records are the authoritative output of the metrics engine.
//! Weekly summaries are derived rollups and can always be regenerated.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// How far a value can be trusted given the history behind it.
/// Ordered so that `min` picks the weakest input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Training stress balance zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TsbZone {
    Overreached,
    Productive,
    Optimal,
    Fresh,
    RaceReady,
    DetrainingRisk,
}

impl TsbZone {
    pub fn classify(tsb: f64) -> Self {
        if tsb < -25.0 {
            TsbZone::Overreached
        } else if tsb < -10.0 {
            TsbZone::Productive
        } else if tsb < 5.0 {
            TsbZone::Optimal
        } else if tsb < 15.0 {
            TsbZone::Fresh
        } else if tsb <= 25.0 {
            TsbZone::RaceReady
        } else {
            TsbZone::DetrainingRisk
        }
    }
}

/// Acute:chronic workload ratio zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcwrZone {
    Undertrained,
    Safe,
    Caution,
    HighRisk,
}

impl AcwrZone {
    pub fn classify(acwr: f64) -> Self {
        if acwr < 0.8 {
            AcwrZone::Undertrained
        } else if acwr <= 1.3 {
            AcwrZone::Safe
        } else if acwr <= 1.5 {
            AcwrZone::Caution
        } else {
            AcwrZone::HighRisk
        }
    }
}

/// ACWR for one day. `value` is `None` until 28 days of history exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acwr {
    pub value: Option<f64>,
    pub acute_avg: f64,
    pub chronic_avg: f64,
    pub zone: Option<AcwrZone>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessLevel {
    Excellent,
    Good,
    Moderate,
    Low,
    Poor,
}

impl ReadinessLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => ReadinessLevel::Excellent,
            65..=79 => ReadinessLevel::Good,
            50..=64 => ReadinessLevel::Moderate,
            35..=49 => ReadinessLevel::Low,
            _ => ReadinessLevel::Poor,
        }
    }
}

/// Normalised (0-100) inputs to the readiness score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessComponents {
    pub tsb_score: f64,
    pub acwr_score: f64,
    pub trend_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Readiness {
    #[validate(range(max = 100))]
    pub score: u8,
    pub level: ReadinessLevel,
    pub confidence: Confidence,
    pub components: ReadinessComponents,
}

/// Metrics for one calendar day, rest days included.
///
/// Stored at: `data/metrics/daily/YYYY-MM-DD.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    #[validate(range(min = 0.0))]
    pub systemic_load: f64,
    #[validate(range(min = 0.0))]
    pub lower_body_load: f64,
    pub activity_count: u32,
    /// Days since the first recorded activity, inclusive
    pub history_days: u32,
    pub ctl: f64,
    pub atl: f64,
    pub tsb: f64,
    pub tsb_zone: TsbZone,
    pub acwr: Acwr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub readiness: Option<Readiness>,
}

/// Weekly rollup of daily metrics (Monday to Sunday).
///
/// Stored at: `data/metrics/weekly/YYYY-Www.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct WeeklySummary {
    /// ISO week key, e.g. "2026-W03"
    pub week: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Days of the week covered by daily records (7 for complete weeks)
    pub days_covered: u32,
    pub total_systemic_load: f64,
    pub total_lower_body_load: f64,
    pub activity_count: u32,
    pub rest_days: u32,
    pub ctl_end: f64,
    pub atl_end: f64,
    pub tsb_end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_acwr: Option<f64>,
}
