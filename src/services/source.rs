//! Upstream activity sources.

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use std::future::Future;

use crate::error::Result;
use crate::models::{AthleteProfile, RawActivity};

/// Time window to fetch, by activity start (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Exclusive lower bound
    pub after: DateTime<Utc>,
    /// Exclusive upper bound; `None` means up to now
    pub before: Option<DateTime<Utc>>,
}

impl FetchWindow {
    pub fn contains(&self, start: DateTime<Utc>) -> bool {
        start > self.after && self.before.map_or(true, |before| start < before)
    }
}

/// One item of an activity stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Activity(RawActivity),
    /// Every activity on `page` has been yielded. A later fetch of the same
    /// window starting at `page + 1` misses nothing.
    PageDone { page: u32 },
}

/// Where activities come from.
///
/// `activities` pages through `window` starting at `first_page` (1-based).
/// Order inside the window is up to the source; only `PageDone` marks
/// progress. Upstream failures
/// ([`AppError::is_upstream`](crate::error::AppError::is_upstream)) end the
/// stream; any other error item concerns a single activity and the stream
/// may continue after it.
pub trait ActivitySource: Send + Sync {
    fn activities(&self, window: FetchWindow, first_page: u32) -> BoxStream<'_, Result<SourceEvent>>;

    fn fetch_profile(&self) -> impl Future<Output = Result<AthleteProfile>> + Send;
}
