// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Training metrics engine.
//!
//! Turns the activity store into one metrics record per calendar day:
//! - CTL/ATL: exponentially weighted load averages (42 and 7 day constants)
//! - TSB: CTL − ATL, classified into form zones
//! - ACWR: 7-day over 28-day average load, undefined before 28 days of history
//! - Readiness: weighted composite of TSB, ACWR and the 3-day load trend
//!
//! Every day depends on the previous one. Days without activities are
//! zero-load days and still advance the recursion; skipping them would
//! carry load forward and overstate fitness.
//!
//! Batch recomputes always start from the first recorded activity and
//! never read persisted metric values, so a change to the load rules reaches
//! every later day. The same activity set always yields byte-identical
//! output files.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, VecDeque};

use crate::db::{daily_metrics_path, weekly_metrics_path, ActivityStore, FileDb};
use crate::error::{AppError, Result};
use crate::models::{
    Activity, Acwr, AcwrZone, Confidence, DailyMetrics, Readiness, ReadinessComponents,
    ReadinessLevel, TsbZone, WeeklySummary,
};
use crate::services::load::round_to;
use crate::time_utils::{days_inclusive, iso_week_key, week_end, week_start};

/// CTL time constant in days.
pub const CTL_DAYS: f64 = 42.0;
/// ATL time constant in days.
pub const ATL_DAYS: f64 = 7.0;
pub const ACWR_ACUTE_DAYS: usize = 7;
pub const ACWR_CHRONIC_DAYS: usize = 28;
const TREND_DAYS: usize = 3;

const TSB_WEIGHT: f64 = 0.5;
const ACWR_WEIGHT: f64 = 0.3;
const TREND_WEIGHT: f64 = 0.2;

/// Aggregated load of one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyLoad {
    pub systemic: f64,
    pub lower_body: f64,
    pub activity_count: u32,
}

/// Daily loads keyed by date. Dates without an entry are zero-load days.
#[derive(Debug, Clone, Default)]
pub struct LoadHistory {
    days: BTreeMap<NaiveDate, DailyLoad>,
}

impl LoadHistory {
    pub fn from_activities<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> Self {
        let mut history = Self::default();
        for activity in activities {
            history.add(activity);
        }
        history
    }

    pub fn add(&mut self, activity: &Activity) {
        let day = self.days.entry(activity.date).or_default();
        day.systemic += activity.load.systemic_load;
        day.lower_body += activity.load.lower_body_load;
        day.activity_count += 1;
    }

    /// Set a day's load directly.
    pub fn insert(&mut self, date: NaiveDate, load: DailyLoad) {
        self.days.insert(date, load);
    }

    pub fn load_on(&self, date: NaiveDate) -> DailyLoad {
        self.days.get(&date).copied().unwrap_or_default()
    }

    /// First day with recorded activity. Zero-load entries do not count.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.days
            .iter()
            .find(|(_, load)| load.activity_count > 0 || load.systemic > 0.0)
            .map(|(date, _)| *date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.first_date().is_none()
    }
}

/// CTL/ATL pair carried from one day to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EwmaState {
    pub ctl: f64,
    pub atl: f64,
}

impl EwmaState {
    pub fn advance(self, load: f64) -> Self {
        Self {
            ctl: self.ctl + (load - self.ctl) / CTL_DAYS,
            atl: self.atl + (load - self.atl) / ATL_DAYS,
        }
    }
}

/// Steps through consecutive days, keeping the EWMA state and the rolling
/// 28-day load window.
#[derive(Debug, Clone)]
pub struct MetricsWalker {
    state: EwmaState,
    /// Systemic loads of the most recent days, newest last
    window: VecDeque<f64>,
    first_date: Option<NaiveDate>,
    next_date: Option<NaiveDate>,
}

impl MetricsWalker {
    /// Start from zero fitness.
    pub fn new(first_date: Option<NaiveDate>) -> Self {
        Self {
            state: EwmaState::default(),
            window: VecDeque::with_capacity(ACWR_CHRONIC_DAYS),
            first_date,
            next_date: None,
        }
    }

    /// Continue from a previously computed day.
    pub fn resume(history: &LoadHistory, previous: &DailyMetrics) -> Self {
        let mut walker = Self::new(history.first_date());
        walker.state = EwmaState {
            ctl: previous.ctl,
            atl: previous.atl,
        };
        let window_start = previous.date - Duration::days(ACWR_CHRONIC_DAYS as i64 - 1);
        for day in days_inclusive(window_start, previous.date) {
            walker.push_window(history.load_on(day).systemic);
        }
        walker.next_date = previous.date.succ_opt();
        walker
    }

    /// Compute `date`, which must directly follow the previous step.
    pub fn step(&mut self, date: NaiveDate, load: DailyLoad) -> DailyMetrics {
        debug_assert!(
            self.next_date.map_or(true, |next| next == date),
            "days must be consecutive"
        );
        self.next_date = date.succ_opt();

        self.state = self.state.advance(load.systemic);
        self.push_window(load.systemic);

        let history_days = match self.first_date {
            Some(first) if first <= date => ((date - first).num_days() + 1) as u32,
            _ => 0,
        };
        let ctl = self.state.ctl;
        let atl = self.state.atl;
        let tsb = ctl - atl;
        let acwr = self.acwr(history_days);
        let readiness = (history_days > 0).then(|| self.readiness(tsb, &acwr, history_days));

        DailyMetrics {
            date,
            systemic_load: round_to(load.systemic, 1),
            lower_body_load: round_to(load.lower_body, 1),
            activity_count: load.activity_count,
            history_days,
            ctl,
            atl,
            tsb,
            tsb_zone: TsbZone::classify(tsb),
            acwr,
            readiness,
        }
    }

    fn push_window(&mut self, load: f64) {
        if self.window.len() == ACWR_CHRONIC_DAYS {
            self.window.pop_front();
        }
        self.window.push_back(load);
    }

    /// Mean of the newest `days` window entries; missing days count as zero.
    fn recent_average(&self, days: usize) -> f64 {
        let sum: f64 = self.window.iter().rev().take(days).sum();
        sum / days as f64
    }

    fn acwr(&self, history_days: u32) -> Acwr {
        let acute_avg = self.recent_average(ACWR_ACUTE_DAYS);
        let chronic_avg = self.recent_average(ACWR_CHRONIC_DAYS);

        let value = if (history_days as usize) < ACWR_CHRONIC_DAYS || chronic_avg <= 0.0 {
            None
        } else {
            Some(acute_avg / chronic_avg)
        };

        Acwr {
            value,
            acute_avg,
            chronic_avg,
            zone: value.map(AcwrZone::classify),
            confidence: if value.is_some() {
                Confidence::High
            } else {
                Confidence::Low
            },
        }
    }

    fn readiness(&self, tsb: f64, acwr: &Acwr, history_days: u32) -> Readiness {
        let tsb_score = ((tsb + 30.0) / 60.0 * 100.0).clamp(0.0, 100.0);

        let acwr_score = match acwr.value {
            None => 50.0,
            Some(v) if v < 0.8 => (100.0 - (0.8 - v) * 125.0).max(0.0),
            Some(v) if v <= 1.3 => 100.0,
            Some(v) => (100.0 - (v - 1.3) * 200.0).max(0.0),
        };

        let trend_avg = self.recent_average(TREND_DAYS);
        let trend_score = if self.state.ctl <= 0.0 {
            50.0
        } else {
            let ratio = trend_avg / self.state.ctl;
            (100.0 - (ratio - 1.0).max(0.0) * 50.0).clamp(0.0, 100.0)
        };

        let tsb_confidence = match history_days {
            0..=13 => Confidence::Low,
            14..=41 => Confidence::Medium,
            _ => Confidence::High,
        };
        let trend_confidence = if (history_days as usize) < TREND_DAYS {
            Confidence::Low
        } else {
            Confidence::High
        };
        let confidence = tsb_confidence.min(acwr.confidence).min(trend_confidence);

        let composite =
            TSB_WEIGHT * tsb_score + ACWR_WEIGHT * acwr_score + TREND_WEIGHT * trend_score;
        let score = composite.round().clamp(0.0, 100.0) as u8;

        Readiness {
            score,
            level: ReadinessLevel::from_score(score),
            confidence,
            components: ReadinessComponents {
                tsb_score: round_to(tsb_score, 1),
                acwr_score: round_to(acwr_score, 1),
                trend_score: round_to(trend_score, 1),
            },
        }
    }
}

/// Metrics for every day in `[start, end]`, walked from the first activity.
pub fn compute_series(history: &LoadHistory, start: NaiveDate, end: NaiveDate) -> Vec<DailyMetrics> {
    if end < start {
        return Vec::new();
    }
    let first = history.first_date();
    let walk_from = first.map_or(start, |f| f.min(start));

    let mut walker = MetricsWalker::new(first);
    days_inclusive(walk_from, end)
        .map(|day| walker.step(day, history.load_on(day)))
        .filter(|m| m.date >= start)
        .collect()
}

/// Roll consecutive daily records up into ISO weeks.
pub fn summarize_weeks(days: &[DailyMetrics]) -> Vec<WeeklySummary> {
    let mut weeks: BTreeMap<NaiveDate, Vec<&DailyMetrics>> = BTreeMap::new();
    for day in days {
        weeks.entry(week_start(day.date)).or_default().push(day);
    }

    weeks
        .into_iter()
        .filter_map(|(start, days)| {
            let last = *days.last()?;
            let peak_acwr = days
                .iter()
                .filter_map(|d| d.acwr.value)
                .fold(None, |peak: Option<f64>, v| Some(peak.map_or(v, |p| p.max(v))));
            Some(WeeklySummary {
                week: iso_week_key(start),
                start_date: start,
                end_date: start + Duration::days(6),
                days_covered: days.len() as u32,
                total_systemic_load: round_to(days.iter().map(|d| d.systemic_load).sum(), 1),
                total_lower_body_load: round_to(days.iter().map(|d| d.lower_body_load).sum(), 1),
                activity_count: days.iter().map(|d| d.activity_count).sum(),
                rest_days: days.iter().filter(|d| d.activity_count == 0).count() as u32,
                ctl_end: last.ctl,
                atl_end: last.atl,
                tsb_end: last.tsb,
                peak_acwr,
            })
        })
        .collect()
}

/// Reads activities, writes daily and weekly metric records.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    db: FileDb,
    store: ActivityStore,
}

impl MetricsEngine {
    pub fn new(db: FileDb) -> Self {
        let store = ActivityStore::new(db.clone());
        Self { db, store }
    }

    /// Aggregate daily loads from every readable activity.
    ///
    /// Malformed activity files are logged and left out.
    pub fn load_history(&self) -> Result<LoadHistory> {
        let loaded = self.store.load_all()?;
        if !loaded.errors.is_empty() {
            tracing::warn!(
                skipped = loaded.errors.len(),
                "Excluded unreadable activities from load history"
            );
        }
        Ok(LoadHistory::from_activities(&loaded.activities))
    }

    /// Recompute and persist every day in `[start, end]`.
    ///
    /// Weekly rollups span whole weeks: the walk runs on past `end` to the
    /// Sunday when later activities or stored daily records fall in that
    /// week, so a narrow recompute never truncates a summary.
    pub fn compute_metrics_batch(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyMetrics>> {
        if end < start {
            return Err(AppError::validation(
                &daily_metrics_path(start),
                format!("range end {} is before start {}", end, start),
            ));
        }
        let history = self.load_history()?;

        let series = compute_series(&history, week_start(start), self.rollup_end(&history, end));
        let in_range: Vec<DailyMetrics> = series
            .iter()
            .filter(|m| m.date >= start && m.date <= end)
            .cloned()
            .collect();

        for day in &in_range {
            self.db.write(daily_metrics_path(day.date), day)?;
        }
        for week in summarize_weeks(&series) {
            self.db.write(weekly_metrics_path(&week.week), &week)?;
        }

        tracing::info!(
            start = %start,
            end = %end,
            days = in_range.len(),
            "Recomputed daily metrics"
        );
        Ok(in_range)
    }

    /// Last day the rollup of `end`'s week reaches: the latest activity or
    /// stored daily record in that week, never before `end`.
    fn rollup_end(&self, history: &LoadHistory, end: NaiveDate) -> NaiveDate {
        let sunday = week_end(end);
        let recorded = days_inclusive(end + Duration::days(1), sunday)
            .filter(|day| self.db.exists(daily_metrics_path(*day)))
            .last();
        let latest = history.last_date().max(recorded).map_or(end, |day| day.max(end));
        latest.min(sunday)
    }

    /// Recompute from the first recorded activity through `through`.
    /// Returns the number of days written.
    pub fn recompute_all(&self, through: NaiveDate) -> Result<usize> {
        let start = match self.load_history()?.first_date() {
            Some(first) if first <= through => first,
            _ => return Ok(0),
        };
        Ok(self.compute_metrics_batch(start, through)?.len())
    }

    /// Compute and persist one day, continuing from the stored previous day
    /// when it is available.
    pub fn compute_daily_metrics(&self, date: NaiveDate) -> Result<DailyMetrics> {
        let history = self.load_history()?;
        let previous = match date.pred_opt() {
            Some(prev) => match self.load_daily_metrics(prev) {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(date = %prev, error = %e, "Ignoring unreadable metrics record");
                    None
                }
            },
            None => None,
        };

        let metrics = match previous {
            Some(previous) => MetricsWalker::resume(&history, &previous).step(date, history.load_on(date)),
            None => compute_series(&history, date, date)
                .pop()
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("empty series for {}", date)))?,
        };

        self.db.write(daily_metrics_path(date), &metrics)?;
        Ok(metrics)
    }

    /// Persisted record for `date`, if any.
    pub fn load_daily_metrics(&self, date: NaiveDate) -> Result<Option<DailyMetrics>> {
        self.db.read_optional(daily_metrics_path(date))
    }
}
