// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the activity store and derived metrics.

pub mod activity;
pub mod athlete;
pub mod lock;
pub mod metrics;
pub mod sync;

pub use activity::{
    Activity, ActivityOrigin, DataQuality, LoadCalculation, RawActivity, RpeSource,
    SportMultiplier, SportType,
};
pub use athlete::AthleteProfile;
pub use lock::LockRecord;
pub use metrics::{
    Acwr, AcwrZone, Confidence, DailyMetrics, Readiness, ReadinessComponents, ReadinessLevel,
    TsbZone, WeeklySummary,
};
pub use sync::{
    SyncOutcome, SyncPhase, SyncProgress, SyncReport, SyncResumeState, SyncStatus,
    TrainingHistory,
};
