// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client.
//!
//! Handles:
//! - Paged activity listing bounded by a fetch window
//! - Athlete profile lookup
//! - Rate limit (429) and authorization (401/403) detection

use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::path::PathBuf;

use crate::config::STRAVA_API_BASE_URL;
use crate::error::{AppError, Result};
use crate::models::{AthleteProfile, RawActivity};
use crate::services::source::{ActivitySource, FetchWindow, SourceEvent};

/// Strava's maximum page size for list endpoints.
const PER_PAGE: u32 = 100;

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl StravaClient {
    pub fn new(access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: STRAVA_API_BASE_URL.to_string(),
            access_token,
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// One page of activities started strictly between `after` and `before`
    /// (unix seconds). Strava orders the listing oldest first when `after`
    /// is given, so pages are addressed by number, never by timestamp.
    pub async fn list_activities(
        &self,
        after: i64,
        before: Option<i64>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<StravaActivitySummary>> {
        let url = format!("{}/athlete/activities", self.base_url);

        let mut query = vec![
            ("after", after.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Get authenticated athlete profile.
    pub async fn get_athlete(&self) -> Result<StravaAthlete> {
        let url = format!("{}/athlete", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let usage = response
                .headers()
                .get("x-ratelimit-usage")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                429 => {
                    tracing::warn!(usage = ?usage, "Strava rate limit hit (429)");
                    AppError::RateLimited(format!(
                        "HTTP 429 (usage {})",
                        usage.as_deref().unwrap_or("unknown")
                    ))
                }
                401 | 403 => AppError::Auth(format!("HTTP {}: {}", status, body)),
                _ => AppError::Network(format!("HTTP {}: {}", status, body)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Network(format!("JSON parse error: {}", e)))
    }
}

/// Next page to request; `done` once a short page has been seen.
struct Paging {
    page: u32,
    done: bool,
}

impl ActivitySource for StravaClient {
    fn activities(&self, window: FetchWindow, first_page: u32) -> BoxStream<'_, Result<SourceEvent>> {
        let after = window.after.timestamp();
        let before = window.before.map(|b| b.timestamp());
        let start = Paging {
            page: first_page.max(1),
            done: false,
        };

        stream::unfold(start, move |paging| async move {
            if paging.done {
                return None;
            }
            let page = paging.page;
            match self.list_activities(after, before, page, PER_PAGE).await {
                Ok(summaries) if summaries.is_empty() => None,
                Ok(summaries) => {
                    let full = summaries.len() as u32 >= PER_PAGE;
                    tracing::debug!(page, count = summaries.len(), "Fetched activity page");

                    let mut events: Vec<Result<SourceEvent>> = summaries
                        .into_iter()
                        .map(|summary| summary.into_raw().map(SourceEvent::Activity))
                        .collect();
                    events.push(Ok(SourceEvent::PageDone { page }));

                    Some((
                        events,
                        Paging {
                            page: page + 1,
                            done: !full,
                        },
                    ))
                }
                Err(e) => Some((vec![Err(e)], Paging { page, done: true })),
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn fetch_profile(&self) -> Result<AthleteProfile> {
        let athlete = self.get_athlete().await?;
        Ok(athlete.into_profile(Utc::now()))
    }
}

/// Summary activity for list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivitySummary {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub sport_type: String,
    /// UTC start, RFC 3339
    pub start_date: String,
    /// Wall-clock start in the athlete's timezone, encoded with a `Z` suffix
    pub start_date_local: String,
    pub elapsed_time: u32,
    #[serde(default)]
    pub moving_time: Option<u32>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub total_elevation_gain: Option<f64>,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
    #[serde(default)]
    pub perceived_exertion: Option<f64>,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl StravaActivitySummary {
    pub fn into_raw(self) -> Result<RawActivity> {
        let source = PathBuf::from(format!("strava/activities/{}", self.id));
        let start_utc = DateTime::parse_from_rfc3339(&self.start_date)
            .map_err(|e| AppError::parse(&source, e))?
            .with_timezone(&Utc);
        let start_local = DateTime::parse_from_rfc3339(&self.start_date_local)
            .map_err(|e| AppError::parse(&source, e))?
            .naive_local();

        Ok(RawActivity {
            external_id: self.id.to_string(),
            name: self.name,
            sport_type: self.sport_type,
            start_local,
            start_utc,
            elapsed_secs: self.elapsed_time,
            moving_secs: self.moving_time,
            distance_m: self.distance,
            elevation_gain_m: self.total_elevation_gain,
            average_hr: self.average_heartrate,
            max_hr: self.max_heartrate,
            perceived_exertion: self.perceived_exertion,
            manual: self.manual,
            description: self.description,
        })
    }
}

/// Authenticated athlete.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub ftp: Option<u32>,
}

impl StravaAthlete {
    pub fn into_profile(self, fetched_at: DateTime<Utc>) -> AthleteProfile {
        AthleteProfile {
            athlete_id: self.id,
            firstname: self.firstname.unwrap_or_default(),
            lastname: self.lastname.unwrap_or_default(),
            weight_kg: self.weight.filter(|w| *w > 0.0),
            ftp_watts: self.ftp.filter(|f| *f > 0),
            fetched_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SUMMARY: &str = r#"{
        "id": 15321465789,
        "name": "Lunch Ride",
        "sport_type": "Ride",
        "start_date": "2026-01-12T20:05:11Z",
        "start_date_local": "2026-01-12T12:05:11Z",
        "elapsed_time": 5400,
        "moving_time": 5012,
        "distance": 40210.3,
        "total_elevation_gain": 410.0,
        "average_heartrate": 141.2,
        "max_heartrate": 172.0,
        "manual": false,
        "map": {"summary_polyline": "abc"}
    }"#;

    #[test]
    fn test_summary_into_raw_keeps_local_wall_clock() {
        let summary: StravaActivitySummary = serde_json::from_str(SUMMARY).unwrap();
        let raw = summary.into_raw().unwrap();

        assert_eq!(raw.external_id, "15321465789");
        assert_eq!(
            raw.start_utc,
            Utc.with_ymd_and_hms(2026, 1, 12, 20, 5, 11).unwrap()
        );
        assert_eq!(raw.start_local.to_string(), "2026-01-12 12:05:11");
        assert_eq!(raw.moving_secs, Some(5012));
        assert_eq!(raw.perceived_exertion, None);
        assert!(!raw.manual);
    }

    #[test]
    fn test_bad_timestamp_is_item_error() {
        let mut summary: StravaActivitySummary = serde_json::from_str(SUMMARY).unwrap();
        summary.start_date = "yesterday".to_string();
        let err = summary.into_raw().unwrap_err();
        assert!(matches!(err, AppError::Parse { .. }));
        assert!(!err.is_upstream());
    }

    #[test]
    fn test_athlete_profile() {
        let athlete: StravaAthlete =
            serde_json::from_str(r#"{"id": 42, "firstname": "Ada", "weight": 0.0}"#).unwrap();
        let fetched = Utc.with_ymd_and_hms(2026, 1, 12, 0, 0, 0).unwrap();
        let profile = athlete.into_profile(fetched);
        assert_eq!(profile.athlete_id, 42);
        assert_eq!(profile.firstname, "Ada");
        assert_eq!(profile.lastname, "");
        assert_eq!(profile.weight_kg, None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = StravaClient::new("token".to_string()).with_base_url("http://localhost:9999/");
        assert_eq!(client.base_url, "http://localhost:9999");
    }
}
