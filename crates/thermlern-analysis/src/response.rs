//! Per-cycle step-response metrics and their window aggregate.
//!
//! For every eligible heating cycle the analyzer looks for the first sample
//! at or above setpoint inside the cycle. From there the response is
//! observed past the end of the cycle until the lookahead cap elapses, the
//! setpoint changes or a manual override starts. Within that observation
//! range:
//!
//! * overshoot is the peak above setpoint over the whole range, so heat
//!   still coming out of the element after it switched off counts,
//! * settling is the first sample from which the temperature stays inside
//!   `setpoint ± tolerance_band_c` for at least the dwell time and never
//!   rises above the band again within the range,
//! * oscillations are setpoint crossings after the first one, up to settling.
//!
//! Cycles that never reach setpoint only report undershoot.

use serde::{Deserialize, Serialize};
use thermlern_core::{
    as_minutes, minutes, CycleEvent, CycleKind, LearningConfig, ResponseMetrics, Sample, SampleWindow,
};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::cycles::SETPOINT_EPSILON;

/// Metrics of one analyzed heating cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResponse {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub setpoint: f64,
    pub overshoot: Option<f64>,
    pub undershoot: Option<f64>,
    pub rise_time_minutes: Option<f64>,
    pub settling_time_minutes: Option<f64>,
    pub oscillation_count: Option<u32>,
}

impl CycleResponse {
    #[must_use]
    pub fn reached_setpoint(&self) -> bool {
        self.rise_time_minutes.is_some()
    }
}

/// Window aggregate, or the explicit absence of one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseOutcome {
    InsufficientData { analyzed: usize, required: usize },
    Measured(ResponseMetrics),
}

impl ResponseOutcome {
    #[must_use]
    pub fn metrics(&self) -> Option<&ResponseMetrics> {
        match self {
            ResponseOutcome::Measured(metrics) => Some(metrics),
            ResponseOutcome::InsufficientData { .. } => None,
        }
    }

    #[must_use]
    pub fn analyzed(&self) -> usize {
        match self {
            ResponseOutcome::Measured(metrics) => metrics.cycles_analyzed,
            ResponseOutcome::InsufficientData { analyzed, .. } => *analyzed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseAnalysis {
    pub cycles: Vec<CycleResponse>,
    pub outcome: ResponseOutcome,
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseAnalyzer {
    tolerance_band_c: f64,
    settling_dwell: Duration,
    lookahead_cap: Duration,
    max_cycles: usize,
}

impl ResponseAnalyzer {
    #[must_use]
    pub fn from_config(config: &LearningConfig) -> Self {
        Self {
            tolerance_band_c: config.tolerance_band_c,
            settling_dwell: minutes(config.settling_dwell_minutes),
            lookahead_cap: minutes(config.lookahead_cap_minutes),
            max_cycles: config.max_cycles_per_window.max(1),
        }
    }

    /// Analyzes the most recent eligible heating cycles of `window`.
    ///
    /// Below `min_events` analyzed cycles the outcome is
    /// [`ResponseOutcome::InsufficientData`]; per-cycle results are returned
    /// either way.
    #[must_use]
    pub fn analyze(&self, window: &SampleWindow, cycles: &[CycleEvent], min_events: usize) -> ResponseAnalysis {
        let eligible: Vec<&CycleEvent> = cycles
            .iter()
            .filter(|c| c.kind == CycleKind::Heating && c.is_eligible())
            .collect();
        let skipped = cycles
            .iter()
            .filter(|c| c.kind == CycleKind::Heating && !c.is_eligible())
            .count();
        let recent = &eligible[eligible.len().saturating_sub(self.max_cycles)..];

        let responses: Vec<CycleResponse> = recent
            .iter()
            .map(|cycle| self.analyze_cycle(window.samples(), cycle))
            .collect();

        debug!(
            analyzed = responses.len(),
            skipped, "analyzed heating responses"
        );

        let outcome = if responses.len() < min_events {
            ResponseOutcome::InsufficientData {
                analyzed: responses.len(),
                required: min_events,
            }
        } else {
            ResponseOutcome::Measured(aggregate(&responses))
        };

        ResponseAnalysis {
            cycles: responses,
            outcome,
        }
    }

    /// Metrics for one heating cycle of `samples`.
    #[must_use]
    pub fn analyze_cycle(&self, samples: &[Sample], cycle: &CycleEvent) -> CycleResponse {
        let setpoint = cycle.setpoint_at_start;
        let mut response = CycleResponse {
            start: cycle.start,
            setpoint,
            overshoot: None,
            undershoot: None,
            rise_time_minutes: None,
            settling_time_minutes: None,
            oscillation_count: None,
        };

        let Some(crossing) =
            (cycle.first_index..=cycle.end_index).find(|&i| samples[i].room_temp >= setpoint)
        else {
            response.undershoot = Some((setpoint - cycle.temp_at_end).max(0.0));
            return response;
        };

        let horizon = cycle.end + self.lookahead_cap;
        let mut last = cycle.end_index;
        for (i, sample) in samples.iter().enumerate().skip(cycle.end_index + 1) {
            if sample.ts > horizon
                || sample.manual_override
                || (sample.setpoint - setpoint).abs() > SETPOINT_EPSILON
            {
                break;
            }
            last = i;
        }

        let peak = samples[crossing..=last]
            .iter()
            .map(|s| s.room_temp)
            .fold(f64::NEG_INFINITY, f64::max);

        // Falling out of the band below is the idle period cooling down;
        // rising out of it above means the response was still moving.
        let settle_from = (crossing..=last)
            .rev()
            .find(|&i| samples[i].room_temp - setpoint > self.tolerance_band_c)
            .map_or(crossing, |i| i + 1);
        let settled = self.settle_index(samples, settle_from, last, setpoint);
        let observed_until = settled.unwrap_or(last);

        let mut above = true;
        let mut crossings = 0;
        for sample in &samples[crossing + 1..=observed_until.max(crossing)] {
            let now_above = sample.room_temp >= setpoint;
            if now_above != above {
                crossings += 1;
                above = now_above;
            }
        }

        response.rise_time_minutes = Some(as_minutes(samples[crossing].ts - cycle.start));
        response.overshoot = Some((peak - setpoint).max(0.0));
        response.oscillation_count = Some(crossings);
        response.settling_time_minutes =
            settled.map(|i| as_minutes(samples[i].ts - samples[crossing].ts));
        response
    }

    /// First index in `from..=to` that starts an in-band run lasting at
    /// least the dwell time.
    fn settle_index(&self, samples: &[Sample], from: usize, to: usize, setpoint: f64) -> Option<usize> {
        let in_band = |i: usize| (samples[i].room_temp - setpoint).abs() <= self.tolerance_band_c;
        let mut i = from;
        while i <= to {
            if !in_band(i) {
                i += 1;
                continue;
            }
            let mut j = i;
            while j < to && in_band(j + 1) {
                j += 1;
            }
            if samples[j].ts - samples[i].ts >= self.settling_dwell {
                return Some(i);
            }
            i = j + 1;
        }
        None
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn aggregate(responses: &[CycleResponse]) -> ResponseMetrics {
    ResponseMetrics {
        overshoot: mean(responses.iter().filter_map(|r| r.overshoot)),
        undershoot: mean(responses.iter().filter_map(|r| r.undershoot)),
        settling_time_minutes: mean(responses.iter().filter_map(|r| r.settling_time_minutes)),
        oscillation_count: mean(
            responses
                .iter()
                .filter_map(|r| r.oscillation_count)
                .map(f64::from),
        ),
        rise_time_minutes: mean(responses.iter().filter_map(|r| r.rise_time_minutes)),
        cycles_analyzed: responses.len(),
        unsettled_cycles: responses
            .iter()
            .filter(|r| r.reached_setpoint() && r.settling_time_minutes.is_none())
            .count(),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cycles::CycleExtractor;

    const SETPOINT: f64 = 21.0;

    /// Samples every 5 minutes from `offset`: heater on for the first
    /// `on_count` temperatures, off afterwards.
    fn series(offset: i64, on_count: usize, temps: &[f64]) -> Vec<Sample> {
        temps
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                Sample::new(
                    OffsetDateTime::UNIX_EPOCH + Duration::minutes(offset + 5 * i as i64),
                    t,
                    i < on_count,
                    SETPOINT,
                )
            })
            .collect()
    }

    /// Leading idle sample, the cycle, and a flat tail at `tail` long
    /// enough to cover the lookahead.
    fn single_cycle(on_count: usize, temps: &[f64], tail: f64) -> SampleWindow {
        let mut all = vec![temps[0]];
        all.extend_from_slice(temps);
        all.extend(std::iter::repeat(tail).take(30));
        let mut samples = series(-5, on_count + 1, &all);
        samples[0].heater_output = thermlern_core::HeaterOutput::Switch(false);
        SampleWindow::new(samples).expect("valid window")
    }

    fn analyze_single(window: &SampleWindow) -> CycleResponse {
        let cycles = CycleExtractor::from_config(&LearningConfig::default()).extract(window);
        let heating = cycles
            .iter()
            .find(|c| c.kind == CycleKind::Heating)
            .expect("heating cycle");
        assert!(heating.is_eligible(), "{heating:?}");
        ResponseAnalyzer::from_config(&LearningConfig::default()).analyze_cycle(window.samples(), heating)
    }

    fn overshooting_temps() -> Vec<f64> {
        // Heater on 0..55, crosses at 50, peaks at 80 with +0.6, back in band at 100.
        vec![
            20.0, 20.1, 20.2, 20.3, 20.4, 20.5, 20.6, 20.7, 20.8, 20.9, 21.0, 21.1, // 0..55 on
            21.2, 21.35, 21.45, 21.55, 21.6, 21.5, 21.4, 21.35, 21.28, 21.25, 21.2, 21.2, 21.15,
            21.1, 21.1,
        ]
    }

    #[test]
    fn overshoot_settling_and_rise_time() {
        let response = analyze_single(&single_cycle(12, &overshooting_temps(), 21.1));

        assert!((response.overshoot.expect("overshoot") - 0.6).abs() < 1e-9);
        assert!((response.rise_time_minutes.expect("rise") - 50.0).abs() < 1e-9);
        assert!((response.settling_time_minutes.expect("settling") - 50.0).abs() < 1e-9);
        assert_eq!(response.oscillation_count, Some(0));
        assert!(response.undershoot.is_none());
    }

    #[test]
    fn overshoot_after_heater_off_is_measured() {
        // In band from 25 min while heating, then the element keeps
        // releasing heat after it switches off at 120.
        let mut temps = vec![20.2, 20.4, 20.6, 20.8, 20.9, 21.0];
        temps.extend(std::iter::repeat(21.1).take(19)); // on until 120
        temps.extend([21.3, 21.5, 21.7, 21.6, 21.5, 21.4, 21.35, 21.25, 21.2]);
        temps.extend(std::iter::repeat(21.1).take(10));
        let response = analyze_single(&single_cycle(24, &temps, 21.05));

        assert!((response.overshoot.expect("overshoot") - 0.7).abs() < 1e-9);
        assert!((response.rise_time_minutes.expect("rise") - 25.0).abs() < 1e-9);
        // Back in band for good at 160 min, 135 after the crossing.
        assert!((response.settling_time_minutes.expect("settling") - 135.0).abs() < 1e-9);
        assert_eq!(response.oscillation_count, Some(0));
    }

    #[test]
    fn cooling_below_the_band_after_settling_keeps_the_settling_point() {
        let temps = [
            20.4, 20.6, 20.8, 21.0, 21.1, 21.1, 21.1, 21.1, 21.1, 21.1, 21.1, 21.1, // on
            21.0, 20.9, 20.8, 20.7, 20.5, 20.3, 20.1,
        ];
        let response = analyze_single(&single_cycle(12, &temps, 20.0));

        assert!((response.overshoot.expect("overshoot") - 0.1).abs() < 1e-9);
        assert_eq!(response.settling_time_minutes, Some(0.0));
    }

    #[test]
    fn never_reaching_setpoint_reports_undershoot_only() {
        let temps = [20.0, 20.1, 20.2, 20.3, 20.4, 20.5, 20.55, 20.6, 20.6, 20.6, 20.6, 20.6, 20.6];
        let response = analyze_single(&single_cycle(12, &temps, 20.5));

        assert!((response.undershoot.expect("undershoot") - 0.4).abs() < 1e-9);
        assert!(response.rise_time_minutes.is_none());
        assert!(response.overshoot.is_none());
        assert!(response.oscillation_count.is_none());
    }

    #[test]
    fn counts_crossings_after_the_first() {
        let temps = [
            20.2, 20.3, 20.4, 20.5, 20.6, 20.7, 20.8, 20.9, 21.0, 21.1, // on 0..45, cross at 40
            20.6, 21.15, 20.6, 21.1, 21.1, 21.05, 21.05, 21.0, 21.0, 21.0, 21.0,
        ];
        let response = analyze_single(&single_cycle(10, &temps, 21.0));

        assert_eq!(response.oscillation_count, Some(4));
        assert!((response.rise_time_minutes.expect("rise") - 40.0).abs() < 1e-9);
        assert!((response.settling_time_minutes.expect("settling") - 25.0).abs() < 1e-9);
        assert!(response.overshoot.expect("overshoot") < 0.2);
    }

    #[test]
    fn insufficient_data_is_not_a_zero_aggregate() {
        let window = single_cycle(12, &overshooting_temps(), 21.1);
        let cycles = CycleExtractor::from_config(&LearningConfig::default()).extract(&window);
        let analysis = ResponseAnalyzer::from_config(&LearningConfig::default()).analyze(&window, &cycles, 3);

        assert_eq!(analysis.cycles.len(), 1);
        assert_eq!(
            analysis.outcome,
            ResponseOutcome::InsufficientData {
                analyzed: 1,
                required: 3
            }
        );
        assert!(analysis.outcome.metrics().is_none());
    }

    #[test]
    fn aggregate_keeps_measured_zero_distinct_from_absent() {
        let temps = [
            20.3, 20.4, 20.5, 20.6, 20.7, 20.8, 20.9, 20.95, 20.95, 20.95, 20.95, 20.95, 20.95,
            20.95, 21.0, 21.0, // on 0..75, cross at 70
            21.0, 21.0, 21.0, 21.0, 21.0, 21.0, 21.0,
        ];
        let window = single_cycle(16, &temps, 21.0);
        let cycles = CycleExtractor::from_config(&LearningConfig::default()).extract(&window);
        let analysis = ResponseAnalyzer::from_config(&LearningConfig::default()).analyze(&window, &cycles, 1);

        let metrics = analysis.outcome.metrics().expect("measured");
        assert_eq!(metrics.overshoot, Some(0.0));
        assert_eq!(metrics.undershoot, None);
        assert_eq!(metrics.oscillation_count, Some(0.0));
        assert!((metrics.rise_time_minutes.expect("rise") - 70.0).abs() < 1e-9);
        assert_eq!(metrics.settling_time_minutes, Some(0.0));
        assert_eq!(metrics.cycles_analyzed, 1);
    }
}
