// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use trainload::config::Config;
use trainload::error::{AppError, Result};
use trainload::models::{
    Activity, ActivityOrigin, AthleteProfile, DataQuality, RawActivity, SportType,
};
use trainload::services::{ActivitySource, FetchWindow, LoadCalculator, SourceEvent};

/// Fixed "today" so lookback windows and metrics horizons are stable.
#[allow(dead_code)]
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
}

/// Temporary repository plus a config with fast lock polling.
pub fn test_repo() -> (TempDir, Config) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = Config::for_root(dir.path());
    config.lock_poll_interval = Duration::from_millis(10);
    (dir, config)
}

fn parse_start(start: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(start, "%Y-%m-%dT%H:%M").expect("start as YYYY-MM-DDTHH:MM")
}

/// Upstream run with local time equal to UTC.
#[allow(dead_code)]
pub fn raw_activity(external_id: &str, start: &str, duration_secs: u32) -> RawActivity {
    let start_local = parse_start(start);
    RawActivity {
        external_id: external_id.to_string(),
        name: "Morning Run".to_string(),
        sport_type: "Run".to_string(),
        start_local,
        start_utc: Utc.from_utc_datetime(&start_local),
        elapsed_secs: duration_secs,
        moving_secs: None,
        distance_m: Some(10_000.0),
        elevation_gain_m: None,
        average_hr: None,
        max_hr: None,
        perceived_exertion: Some(5.0),
        manual: false,
        description: None,
    }
}

/// Hand-logged run, as stored before any sync sees it.
#[allow(dead_code)]
pub fn manual_activity(id: &str, start: &str, duration_secs: u32) -> Activity {
    let start_time = parse_start(start);
    Activity {
        id: id.to_string(),
        origin: ActivityOrigin::Manual,
        external_id: None,
        name: "Easy run".to_string(),
        date: start_time.date(),
        start_time,
        sport: SportType::Run,
        duration_secs,
        distance_m: None,
        elevation_gain_m: None,
        average_hr: None,
        max_hr: None,
        perceived_exertion: Some(4),
        quality: DataQuality {
            manual_entry: true,
            ..DataQuality::default()
        },
        notes: None,
        load: LoadCalculator::default().calculate(SportType::Run, duration_secs, Some(4), None),
        ingested_at: Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 0).unwrap(),
    }
}

/// One scripted upstream event.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Step {
    Activity(RawActivity),
    RateLimit,
    NetworkFailure,
}

/// In-memory activity source that replays fixed pages, honouring the fetch
/// window and the first requested page like the real API does. Upstream
/// errors end the stream.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    pages: Vec<Vec<Step>>,
    profile: Option<AthleteProfile>,
    requests: Arc<Mutex<Vec<(FetchWindow, u32)>>>,
}

#[allow(dead_code)]
impl ScriptedSource {
    /// Everything on a single page.
    pub fn new(steps: Vec<Step>) -> Self {
        Self::paged(vec![steps])
    }

    pub fn paged(pages: Vec<Vec<Step>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn activities_only(activities: Vec<RawActivity>) -> Self {
        Self::new(activities.into_iter().map(Step::Activity).collect())
    }

    pub fn with_profile(mut self) -> Self {
        self.profile = Some(AthleteProfile {
            athlete_id: 42,
            firstname: "Ada".to_string(),
            lastname: "Runner".to_string(),
            weight_kg: Some(61.5),
            ftp_watts: None,
            fetched_at: Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap(),
        });
        self
    }

    /// Every `(window, first_page)` asked for so far.
    pub fn requests(&self) -> Vec<(FetchWindow, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

impl ActivitySource for ScriptedSource {
    fn activities(&self, window: FetchWindow, first_page: u32) -> BoxStream<'_, Result<SourceEvent>> {
        self.requests.lock().unwrap().push((window, first_page));

        let mut events = Vec::new();
        'pages: for (index, steps) in self.pages.iter().enumerate() {
            let page = index as u32 + 1;
            if page < first_page {
                continue;
            }
            for step in steps {
                match step {
                    Step::Activity(raw) if window.contains(raw.start_utc) => {
                        events.push(Ok(SourceEvent::Activity(raw.clone())))
                    }
                    Step::Activity(_) => {}
                    Step::RateLimit => {
                        events.push(Err(AppError::RateLimited("HTTP 429".to_string())));
                        break 'pages;
                    }
                    Step::NetworkFailure => {
                        events.push(Err(AppError::Network("connection reset".to_string())));
                        break 'pages;
                    }
                }
            }
            events.push(Ok(SourceEvent::PageDone { page }));
        }
        stream::iter(events).boxed()
    }

    async fn fetch_profile(&self) -> Result<AthleteProfile> {
        self.profile
            .clone()
            .ok_or_else(|| AppError::Network("profile unavailable".to_string()))
    }
}
