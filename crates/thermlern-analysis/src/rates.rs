//! Measured heating and cooling rates.
//!
//! Every eligible cycle of sufficient length yields one rate sample: the
//! temperature change across a heating cycle, or the drop across an idle
//! cycle, per hour. Samples whose magnitude is further than the outlier
//! factor from the median (or whose sign disagrees with it) are discarded
//! before averaging.

use thermlern_core::{as_minutes, CycleEvent, CycleKind, LearningConfig, RateEstimate, RateSource, ThermalRates};
use tracing::debug;

/// Fewest surviving samples that make a rate estimate.
pub const MIN_RATE_SAMPLES: usize = 2;

/// Medians smaller than this (°C/h) cannot anchor a ratio test.
const FLAT_MEDIAN: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct ThermalRateEstimator {
    min_cycle_minutes: f64,
    outlier_factor: f64,
}

impl ThermalRateEstimator {
    #[must_use]
    pub fn from_config(config: &LearningConfig) -> Self {
        Self {
            min_cycle_minutes: config.min_rate_cycle_minutes,
            outlier_factor: config.outlier_factor.max(1.0),
        }
    }

    #[must_use]
    pub fn estimate(&self, cycles: &[CycleEvent]) -> ThermalRates {
        ThermalRates {
            heat_rate_c_per_hour: self.estimate_kind(cycles, CycleKind::Heating),
            cool_rate_c_per_hour: self.estimate_kind(cycles, CycleKind::Idle),
        }
    }

    fn estimate_kind(&self, cycles: &[CycleEvent], kind: CycleKind) -> Option<RateEstimate> {
        let samples: Vec<f64> = cycles
            .iter()
            .filter(|c| c.kind == kind && c.is_eligible())
            .filter(|c| c.duration_minutes() >= self.min_cycle_minutes)
            .map(|c| {
                let hours = as_minutes(c.duration()) / 60.0;
                let delta = match kind {
                    CycleKind::Heating => c.temp_at_end - c.temp_at_start,
                    CycleKind::Idle => c.temp_at_start - c.temp_at_end,
                };
                delta / hours
            })
            .filter(|r| r.is_finite())
            .collect();

        let median = median(&samples)?;
        let kept: Vec<f64> = samples
            .iter()
            .copied()
            .filter(|&r| self.consistent_with(r, median))
            .collect();
        let rejected = samples.len() - kept.len();

        debug!(
            ?kind,
            candidates = samples.len(),
            rejected,
            median,
            "rate samples"
        );

        if kept.len() < MIN_RATE_SAMPLES {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = kept.iter().sum::<f64>() / kept.len() as f64;
        Some(RateEstimate {
            c_per_hour: mean,
            sample_count: kept.len(),
            rejected_count: rejected,
            source: RateSource::Measured,
        })
    }

    fn consistent_with(&self, rate: f64, median: f64) -> bool {
        if median.abs() < FLAT_MEDIAN {
            return true;
        }
        rate * median > 0.0
            && rate.abs() <= median.abs() * self.outlier_factor
            && rate.abs() >= median.abs() / self.outlier_factor
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
