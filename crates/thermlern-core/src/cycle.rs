//! Heating/idle cycles and the performance signals derived from them.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    Heating,
    Idle,
}

/// Why a cycle must not feed any aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Contamination {
    SetpointChange { from: f64, to: f64 },
    /// The setpoint changed this many minutes from the cycle start
    /// (negative: before it), outside the cycle itself.
    NearSetpointChange { minutes: f64 },
    ManualOverride,
    SampleGap { minutes: f64 },
}

/// A maximal interval with the heater continuously active (heating) or
/// continuously inactive (idle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleEvent {
    pub kind: CycleKind,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
    pub setpoint_at_start: f64,
    pub temp_at_start: f64,
    pub temp_at_end: f64,
    /// Peak temperature for heating cycles, trough for idle cycles.
    pub extreme_temp: f64,
    /// Minutes between the extreme reading and `end`.
    pub extreme_offset_minutes: f64,
    /// `false` when the window cut the cycle at either side.
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contamination: Vec<Contamination>,
    /// Index of the first sample inside the cycle.
    pub first_index: usize,
    /// Index of the sample that closes the cycle (the transition sample,
    /// or the last sample of the window for an incomplete cycle).
    pub end_index: usize,
}

impl CycleEvent {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    #[must_use]
    pub fn duration_minutes(&self) -> f64 {
        crate::as_minutes(self.duration())
    }

    #[must_use]
    pub fn is_contaminated(&self) -> bool {
        !self.contamination.is_empty()
    }

    /// Complete and uncontaminated: the only cycles any aggregate may use.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.complete && !self.is_contaminated()
    }
}

/// Window aggregate of per-cycle response metrics.
///
/// Each metric is `None` when no analyzed cycle produced it (for instance
/// `rise_time_minutes` when no cycle ever reached its setpoint). A measured
/// zero is `Some(0.0)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    /// °C above setpoint, mean over cycles that reached setpoint.
    pub overshoot: Option<f64>,
    /// °C short of setpoint, mean over cycles that never reached it.
    pub undershoot: Option<f64>,
    pub settling_time_minutes: Option<f64>,
    pub oscillation_count: Option<f64>,
    pub rise_time_minutes: Option<f64>,
    pub cycles_analyzed: usize,
    /// Cycles that reached setpoint but never settled inside the lookahead.
    #[serde(default)]
    pub unsettled_cycles: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    #[default]
    Measured,
    Physics,
}

/// One thermal rate with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    pub c_per_hour: f64,
    pub sample_count: usize,
    pub rejected_count: usize,
    #[serde(default)]
    pub source: RateSource,
}

impl RateEstimate {
    #[must_use]
    pub fn physics(c_per_hour: f64) -> Self {
        Self {
            c_per_hour,
            sample_count: 0,
            rejected_count: 0,
            source: RateSource::Physics,
        }
    }
}

/// Heat rate (heater continuously on) and cool rate (heater continuously off),
/// both as positive °C/hour magnitudes in the expected direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermalRates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_rate_c_per_hour: Option<RateEstimate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cool_rate_c_per_hour: Option<RateEstimate>,
}

impl ThermalRates {
    /// Takes every rate present in `update`, keeps ours where it is absent.
    #[must_use]
    pub fn merged_with(self, update: ThermalRates) -> ThermalRates {
        ThermalRates {
            heat_rate_c_per_hour: update.heat_rate_c_per_hour.or(self.heat_rate_c_per_hour),
            cool_rate_c_per_hour: update.cool_rate_c_per_hour.or(self.cool_rate_c_per_hour),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_prior_rate_when_update_is_unavailable() {
        let prior = ThermalRates {
            heat_rate_c_per_hour: Some(RateEstimate::physics(1.0)),
            cool_rate_c_per_hour: Some(RateEstimate::physics(0.3)),
        };
        let update = ThermalRates {
            heat_rate_c_per_hour: Some(RateEstimate {
                c_per_hour: 1.8,
                sample_count: 4,
                rejected_count: 1,
                source: RateSource::Measured,
            }),
            cool_rate_c_per_hour: None,
        };

        let merged = prior.merged_with(update);
        assert_eq!(merged.heat_rate_c_per_hour, update.heat_rate_c_per_hour);
        assert_eq!(merged.cool_rate_c_per_hour, prior.cool_rate_c_per_hour);
    }
}
