//! Splits a sample window into heating and idle cycles.

use serde::{Deserialize, Serialize};
use thermlern_core::{
    as_minutes, minutes, Contamination, CycleEvent, CycleKind, LearningConfig, Sample, SampleWindow,
};
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Setpoints closer than this are the same setpoint.
pub(crate) const SETPOINT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct CycleExtractor {
    gap_tolerance: Duration,
    setpoint_buffer: Duration,
}

impl CycleExtractor {
    #[must_use]
    pub fn new(gap_tolerance: Duration, setpoint_buffer: Duration) -> Self {
        Self {
            gap_tolerance,
            setpoint_buffer,
        }
    }

    #[must_use]
    pub fn from_config(config: &LearningConfig) -> Self {
        Self::new(
            minutes(config.gap_tolerance_minutes),
            minutes(config.setpoint_change_buffer_minutes),
        )
    }

    /// Every maximal run of equal heater state becomes one cycle.
    ///
    /// A run only counts as complete when both of its transitions were
    /// observed: the first run of the window started before it and the last
    /// run is still going. Incomplete and contaminated cycles stay in the
    /// result so callers can report on them.
    ///
    /// Heating cycles starting within the setpoint buffer of a setpoint
    /// change anywhere in the window are contaminated as well.
    #[must_use]
    pub fn extract(&self, window: &SampleWindow) -> Vec<CycleEvent> {
        let samples = window.samples();
        let changes: Vec<OffsetDateTime> = samples
            .windows(2)
            .filter(|pair| (pair[1].setpoint - pair[0].setpoint).abs() > SETPOINT_EPSILON)
            .map(|pair| pair[1].ts)
            .collect();
        let mut cycles = Vec::new();
        let mut run_start = 0;

        for i in 1..=samples.len() {
            let boundary =
                i == samples.len() || samples[i].heater_active() != samples[run_start].heater_active();
            if !boundary {
                continue;
            }
            let closed = i < samples.len();
            let end_index = if closed { i } else { samples.len() - 1 };
            let mut cycle = self.build(samples, run_start, end_index, closed && run_start > 0);
            self.flag_near_setpoint_change(&mut cycle, &changes);
            cycles.push(cycle);
            run_start = i;
        }

        let contaminated = cycles.iter().filter(|c| c.is_contaminated()).count();
        debug!(
            cycles = cycles.len(),
            contaminated, "extracted cycles from {} samples", samples.len()
        );
        cycles
    }

    fn build(&self, samples: &[Sample], first: usize, end_index: usize, complete: bool) -> CycleEvent {
        let head = &samples[first];
        let tail = &samples[end_index];
        let kind = if head.heater_active() {
            CycleKind::Heating
        } else {
            CycleKind::Idle
        };

        // The closing transition sample already belongs to the next run.
        let interior = if tail.heater_active() == head.heater_active() {
            &samples[first..=end_index]
        } else {
            &samples[first..end_index]
        };

        let mut extreme = head;
        for sample in &samples[first..=end_index] {
            let better = match kind {
                CycleKind::Heating => sample.room_temp > extreme.room_temp,
                CycleKind::Idle => sample.room_temp < extreme.room_temp,
            };
            if better {
                extreme = sample;
            }
        }

        CycleEvent {
            kind,
            start: head.ts,
            end: tail.ts,
            setpoint_at_start: head.setpoint,
            temp_at_start: head.room_temp,
            temp_at_end: tail.room_temp,
            extreme_temp: extreme.room_temp,
            extreme_offset_minutes: as_minutes(tail.ts - extreme.ts),
            complete,
            contamination: self.contamination(interior, &samples[first..=end_index]),
            first_index: first,
            end_index,
        }
    }

    fn flag_near_setpoint_change(&self, cycle: &mut CycleEvent, changes: &[OffsetDateTime]) {
        let already = cycle
            .contamination
            .iter()
            .any(|c| matches!(c, Contamination::SetpointChange { .. }));
        if cycle.kind != CycleKind::Heating || already {
            return;
        }
        if let Some(offset) = changes
            .iter()
            .map(|&ts| ts - cycle.start)
            .filter(|offset| offset.abs() <= self.setpoint_buffer)
            .min_by_key(|offset| offset.abs())
        {
            cycle.contamination.push(Contamination::NearSetpointChange {
                minutes: as_minutes(offset),
            });
        }
    }

    fn contamination(&self, interior: &[Sample], span: &[Sample]) -> Vec<Contamination> {
        let mut found = Vec::new();
        let setpoint = interior[0].setpoint;

        if let Some(changed) = interior
            .iter()
            .find(|s| (s.setpoint - setpoint).abs() > SETPOINT_EPSILON)
        {
            found.push(Contamination::SetpointChange {
                from: setpoint,
                to: changed.setpoint,
            });
        }
        if interior.iter().any(|s| s.manual_override) {
            found.push(Contamination::ManualOverride);
        }
        let widest_gap = span
            .windows(2)
            .map(|pair| pair[1].ts - pair[0].ts)
            .max()
            .unwrap_or(Duration::ZERO);
        if widest_gap > self.gap_tolerance {
            found.push(Contamination::SampleGap {
                minutes: as_minutes(widest_gap),
            });
        }
        found
    }
}

/// Duty and cycling behaviour over a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleStatistics {
    /// Complete, uncontaminated heating cycles.
    pub heating_cycles: usize,
    pub mean_heating_minutes: Option<f64>,
    /// Share of the window with the heater active, in percent.
    pub duty_cycle_percent: f64,
    pub short_cycles: usize,
    pub very_short_cycles: usize,
}

impl CycleStatistics {
    #[must_use]
    pub fn from_cycles(
        cycles: &[CycleEvent],
        window_span: Duration,
        short_minutes: f64,
        very_short_minutes: f64,
    ) -> Self {
        let heating_minutes: f64 = cycles
            .iter()
            .filter(|c| c.kind == CycleKind::Heating)
            .map(CycleEvent::duration_minutes)
            .sum();
        let span_minutes = as_minutes(window_span);
        let duty_cycle_percent = if span_minutes > 0.0 {
            (heating_minutes / span_minutes * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let durations: Vec<f64> = cycles
            .iter()
            .filter(|c| c.kind == CycleKind::Heating && c.is_eligible())
            .map(CycleEvent::duration_minutes)
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let mean_heating_minutes = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        Self {
            heating_cycles: durations.len(),
            mean_heating_minutes,
            duty_cycle_percent,
            short_cycles: durations.iter().filter(|d| **d < short_minutes).count(),
            very_short_cycles: durations.iter().filter(|d| **d < very_short_minutes).count(),
        }
    }

    /// Short cycles occur at least `repeat` times and make up at least
    /// half of all heating cycles.
    #[must_use]
    pub fn is_short_cycling(&self, repeat: usize) -> bool {
        self.short_cycles >= repeat.max(1) && self.short_cycles * 2 >= self.heating_cycles
    }
}
