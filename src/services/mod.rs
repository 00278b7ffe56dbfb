// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod dedup;
pub mod load;
pub mod metrics;
pub mod normalize;
pub mod source;
pub mod status;
pub mod strava;
pub mod sync;

pub use dedup::{Duplicate, DuplicateDetector};
pub use load::LoadCalculator;
pub use metrics::{DailyLoad, LoadHistory, MetricsEngine};
pub use source::{ActivitySource, FetchWindow, SourceEvent};
pub use status::sync_status;
pub use strava::StravaClient;
pub use sync::SyncPipeline;
