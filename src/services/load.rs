// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-activity training load.
//!
//! `base_effort = RPE × minutes`, then split into two channels by the
//! sport's multipliers: systemic load (overall fatigue) and lower-body
//! load (impact on the legs). An activity's load depends only on its own
//! fields and the multiplier configuration, never on other activities.

use crate::config::LoadSettings;
use crate::models::{LoadCalculation, RpeSource, SportType};

/// Computes load sub-records from activity fields.
#[derive(Debug, Clone, Default)]
pub struct LoadCalculator {
    settings: LoadSettings,
}

impl LoadCalculator {
    pub fn new(settings: LoadSettings) -> Self {
        Self { settings }
    }

    pub fn calculate(
        &self,
        sport: SportType,
        duration_secs: u32,
        perceived_exertion: Option<u8>,
        average_hr: Option<u16>,
    ) -> LoadCalculation {
        let (rpe, rpe_source) = self.resolve_rpe(perceived_exertion, average_hr);
        let multiplier = self.settings.multiplier(sport);

        let duration_minutes = f64::from(duration_secs) / 60.0;
        let base_effort = f64::from(rpe) * duration_minutes;

        LoadCalculation {
            rpe,
            rpe_source,
            duration_minutes: round_to(duration_minutes, 2),
            base_effort: round_to(base_effort, 1),
            systemic_multiplier: multiplier.systemic,
            lower_body_multiplier: multiplier.lower_body,
            systemic_load: round_to(base_effort * multiplier.systemic, 1),
            lower_body_load: round_to(base_effort * multiplier.lower_body, 1),
        }
    }

    /// Reported RPE wins, then a heart-rate estimate, then the default.
    pub fn resolve_rpe(
        &self,
        perceived_exertion: Option<u8>,
        average_hr: Option<u16>,
    ) -> (u8, RpeSource) {
        if let Some(rpe) = perceived_exertion.filter(|r| (1..=10).contains(r)) {
            return (rpe, RpeSource::Reported);
        }
        if let (Some(avg), Some(max)) = (average_hr, self.settings.max_heart_rate) {
            if max > 0 {
                return (rpe_from_heart_rate(avg, max), RpeSource::HeartRate);
            }
        }
        (self.settings.default_rpe, RpeSource::Default)
    }
}

/// Bucket average HR (as a share of max HR) into RPE 2-9.
fn rpe_from_heart_rate(average_hr: u16, max_hr: u16) -> u8 {
    let pct = f64::from(average_hr) / f64::from(max_hr);
    match pct {
        p if p < 0.60 => 2,
        p if p < 0.70 => 3,
        p if p < 0.75 => 4,
        p if p < 0.80 => 5,
        p if p < 0.85 => 6,
        p if p < 0.90 => 7,
        p if p < 0.95 => 8,
        _ => 9,
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SportMultiplier;

    #[test]
    fn test_run_load_is_rpe_times_minutes() {
        let calc = LoadCalculator::default();
        let load = calc.calculate(SportType::Run, 3600, Some(5), None);

        assert_eq!(load.rpe, 5);
        assert_eq!(load.rpe_source, RpeSource::Reported);
        assert_eq!(load.duration_minutes, 60.0);
        assert_eq!(load.base_effort, 300.0);
        assert_eq!(load.systemic_load, 300.0);
        assert_eq!(load.lower_body_load, 300.0);
    }

    #[test]
    fn test_cycling_splits_channels() {
        let calc = LoadCalculator::default();
        let load = calc.calculate(SportType::Cycle, 3600, Some(5), None);

        assert_eq!(load.systemic_load, 255.0);
        assert_eq!(load.lower_body_load, 105.0);
    }

    #[test]
    fn test_heart_rate_estimate_used_without_reported_rpe() {
        let calc = LoadCalculator::new(LoadSettings {
            max_heart_rate: Some(190),
            ..LoadSettings::default()
        });

        // 152 / 190 = 0.80 -> RPE 6
        assert_eq!(calc.resolve_rpe(None, Some(152)), (6, RpeSource::HeartRate));
        assert_eq!(calc.resolve_rpe(None, Some(100)), (2, RpeSource::HeartRate));
        assert_eq!(calc.resolve_rpe(None, Some(185)), (9, RpeSource::HeartRate));
        // Reported RPE still wins
        assert_eq!(calc.resolve_rpe(Some(3), Some(185)), (3, RpeSource::Reported));
    }

    #[test]
    fn test_default_rpe_without_inputs() {
        let calc = LoadCalculator::default();
        // No max HR configured, so HR alone is not enough
        assert_eq!(calc.resolve_rpe(None, Some(150)), (5, RpeSource::Default));
        // Out-of-range reported values are ignored
        assert_eq!(calc.resolve_rpe(Some(0), None), (5, RpeSource::Default));
    }

    #[test]
    fn test_multiplier_override() {
        let mut settings = LoadSettings::default();
        settings.multipliers.insert(
            SportType::Swim,
            SportMultiplier {
                systemic: 1.0,
                lower_body: 0.0,
            },
        );
        let load = LoadCalculator::new(settings).calculate(SportType::Swim, 1800, Some(6), None);
        assert_eq!(load.systemic_load, 180.0);
        assert_eq!(load.lower_body_load, 0.0);
    }

    #[test]
    fn test_loads_are_rounded_to_tenths() {
        let load = LoadCalculator::default().calculate(SportType::TrailRun, 2_000, Some(7), None);
        // 7 × 33.333.. = 233.33.., × 1.05 = 245.0, × 1.10 = 256.67
        assert_eq!(load.base_effort, 233.3);
        assert_eq!(load.systemic_load, 245.0);
        assert_eq!(load.lower_body_load, 256.7);
    }
}
