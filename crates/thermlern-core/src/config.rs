//! Installation-wide learning parameters.

use serde::{Deserialize, Serialize};

use crate::rules::RuleTable;
use crate::zone::ZoneConfig;

/// Tunables shared by every zone. All durations are in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Longest tolerated silence between two samples inside a cycle.
    pub gap_tolerance_minutes: f64,
    /// Half-width of the settling band around setpoint (°C).
    pub tolerance_band_c: f64,
    /// Time the temperature must stay inside the band to count as settled.
    pub settling_dwell_minutes: f64,
    /// How long after a heating cycle ends the response is still observed.
    pub lookahead_cap_minutes: f64,
    /// Only the most recent eligible heating cycles are analyzed.
    pub max_cycles_per_window: usize,
    /// Heating cycles starting this close to a setpoint change are skipped.
    pub setpoint_change_buffer_minutes: f64,
    /// Single-cycle rates further than this factor from the median are rejected.
    pub outlier_factor: f64,
    /// Cycles shorter than this do not produce a rate sample.
    pub min_rate_cycle_minutes: f64,
    /// Largest relative change of any gain in one run.
    pub max_gain_step: f64,
    pub pwm_step_minutes: f64,
    /// Short heating cycles needed before the PWM period is lengthened.
    pub short_cycle_repeat: usize,
    /// Indoor/outdoor difference used for the physics cool-rate estimate (°C).
    pub design_delta_c: f64,
    pub rules: RuleTable,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            gap_tolerance_minutes: 10.0,
            tolerance_band_c: 0.3,
            settling_dwell_minutes: 30.0,
            lookahead_cap_minutes: 120.0,
            max_cycles_per_window: 20,
            setpoint_change_buffer_minutes: 120.0,
            outlier_factor: 2.0,
            min_rate_cycle_minutes: 10.0,
            max_gain_step: 0.25,
            pwm_step_minutes: 5.0,
            short_cycle_repeat: 2,
            design_delta_c: 20.0,
            rules: RuleTable::default(),
        }
    }
}

impl LearningConfig {
    /// The zone's own rule table if it has one, ours otherwise.
    #[must_use]
    pub fn rules_for<'a>(&'a self, zone: &'a ZoneConfig) -> &'a RuleTable {
        zone.rules.as_ref().unwrap_or(&self.rules)
    }

    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("gap_tolerance_minutes", self.gap_tolerance_minutes),
            ("tolerance_band_c", self.tolerance_band_c),
            ("settling_dwell_minutes", self.settling_dwell_minutes),
            ("lookahead_cap_minutes", self.lookahead_cap_minutes),
            ("outlier_factor", self.outlier_factor),
            ("pwm_step_minutes", self.pwm_step_minutes),
            ("design_delta_c", self.design_delta_c),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{name} must be positive (got {value})"));
            }
        }
        let buffer = self.setpoint_change_buffer_minutes;
        if !(buffer.is_finite() && buffer >= 0.0) {
            return Err(format!("setpoint_change_buffer_minutes must not be negative (got {buffer})"));
        }
        if self.outlier_factor < 1.0 {
            return Err("outlier_factor must be at least 1".to_string());
        }
        if !(self.max_gain_step.is_finite() && self.max_gain_step > 0.0 && self.max_gain_step < 1.0) {
            return Err(format!(
                "max_gain_step must lie in (0, 1) (got {})",
                self.max_gain_step
            ));
        }
        if self.max_cycles_per_window == 0 {
            return Err("max_cycles_per_window must be at least 1".to_string());
        }
        self.rules.validate()
    }
}
