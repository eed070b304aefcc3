//! Rule-table driven PID and PWM adjustment.

use serde::{Deserialize, Serialize};
use thermlern_analysis::{CycleStatistics, ResponseOutcome};
use thermlern_core::{
    ControllerSettings, Gain, LearningConfig, Metric, PidGains, ResponseMetrics, RuleTable, ZoneConfig,
};
use tracing::{debug, warn};

/// Mean oscillation count above which the PWM period is shortened.
const PWM_OSCILLATION_THRESHOLD: f64 = 3.0;

/// Composite multiplicative factor per gain after all fired rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainFactors {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for GainFactors {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 1.0,
            kd: 1.0,
        }
    }
}

impl GainFactors {
    fn slot(&mut self, gain: Gain) -> &mut f64 {
        match gain {
            Gain::Kp => &mut self.kp,
            Gain::Ki => &mut self.ki,
            Gain::Kd => &mut self.kd,
        }
    }

    fn capped(self, max_step: f64) -> Self {
        let cap = |f: f64| f.clamp(1.0 - max_step, 1.0 + max_step);
        Self {
            kp: cap(self.kp),
            ki: cap(self.ki),
            kd: cap(self.kd),
        }
    }

    fn apply(self, gains: PidGains) -> PidGains {
        PidGains {
            kp: gains.kp * self.kp,
            ki: gains.ki * self.ki,
            kd: gains.kd * self.kd,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PwmChange {
    #[default]
    Unchanged,
    Lengthened,
    Shortened,
}

/// A computed value that left its configured bounds and was clamped back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsCorrection {
    pub parameter: String,
    pub computed: f64,
    pub clamped: f64,
}

/// Result of one adjustment pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub settings: ControllerSettings,
    pub fired_rules: Vec<String>,
    pub factors: GainFactors,
    pub pwm_change: PwmChange,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounds_corrections: Vec<BoundsCorrection>,
}

impl Adjustment {
    /// No rule evaluated, settings passed through.
    #[must_use]
    pub fn unchanged(settings: ControllerSettings) -> Self {
        Self {
            settings,
            fired_rules: Vec::new(),
            factors: GainFactors::default(),
            pwm_change: PwmChange::Unchanged,
            bounds_corrections: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdaptiveAdjustmentEngine {
    max_gain_step: f64,
    pwm_step_minutes: f64,
    short_cycle_repeat: usize,
}

impl AdaptiveAdjustmentEngine {
    #[must_use]
    pub fn from_config(config: &LearningConfig) -> Self {
        Self {
            max_gain_step: config.max_gain_step,
            pwm_step_minutes: config.pwm_step_minutes,
            short_cycle_repeat: config.short_cycle_repeat,
        }
    }

    /// Computes the next recommendation from `current`.
    ///
    /// With insufficient data `current` comes back untouched. Otherwise the
    /// rule table is evaluated in order, the composite factor per gain is
    /// capped to the maximum step and the result is clamped to the zone's
    /// bounds.
    #[must_use]
    pub fn adjust(
        &self,
        zone: &ZoneConfig,
        rules: &RuleTable,
        outcome: &ResponseOutcome,
        statistics: &CycleStatistics,
        current: ControllerSettings,
    ) -> Adjustment {
        let Some(metrics) = outcome.metrics() else {
            return Adjustment::unchanged(current);
        };

        let mut corrections = Vec::new();
        let base = clamp_settings(zone, current, &mut corrections);

        let (fired_rules, raw) = evaluate(rules, metrics);
        let factors = raw.capped(self.max_gain_step);
        if factors != raw {
            debug!(zone = %zone.zone_id, ?raw, ?factors, "gain step capped");
        }

        let (pwm_change, pwm_minutes) = if statistics.is_short_cycling(self.short_cycle_repeat) {
            (PwmChange::Lengthened, base.pwm_minutes + self.pwm_step_minutes)
        } else if metrics
            .oscillation_count
            .is_some_and(|n| n > PWM_OSCILLATION_THRESHOLD)
        {
            (PwmChange::Shortened, base.pwm_minutes - self.pwm_step_minutes)
        } else {
            (PwmChange::Unchanged, base.pwm_minutes)
        };

        let proposed = ControllerSettings {
            gains: factors.apply(base.gains),
            pwm_minutes,
        };
        let settings = clamp_settings(zone, proposed, &mut corrections);

        Adjustment {
            settings,
            fired_rules,
            factors,
            pwm_change,
            bounds_corrections: corrections,
        }
    }
}

/// Fires every rule whose conditions all hold and multiplies their effects.
#[must_use]
pub fn evaluate(rules: &RuleTable, metrics: &ResponseMetrics) -> (Vec<String>, GainFactors) {
    let mut fired = Vec::new();
    let mut factors = GainFactors::default();
    for rule in &rules.rules {
        if rule
            .when
            .iter()
            .all(|c| c.holds(metric_value(metrics, c.metric())))
        {
            for effect in &rule.effects {
                *factors.slot(effect.gain) *= effect.factor;
            }
            fired.push(rule.name.clone());
        }
    }
    (fired, factors)
}

fn metric_value(metrics: &ResponseMetrics, metric: Metric) -> Option<f64> {
    match metric {
        Metric::Overshoot => metrics.overshoot,
        Metric::Undershoot => metrics.undershoot,
        Metric::RiseTime => metrics.rise_time_minutes,
        Metric::SettlingTime => metrics.settling_time_minutes,
        Metric::OscillationCount => metrics.oscillation_count,
    }
}

/// Clamps to the zone's bounds, logging and recording every change.
pub(crate) fn clamp_settings(
    zone: &ZoneConfig,
    settings: ControllerSettings,
    corrections: &mut Vec<BoundsCorrection>,
) -> ControllerSettings {
    let clamped = settings.clamped_to(zone);
    let pairs = [
        ("kp", settings.gains.kp, clamped.gains.kp),
        ("ki", settings.gains.ki, clamped.gains.ki),
        ("kd", settings.gains.kd, clamped.gains.kd),
        ("pwm_minutes", settings.pwm_minutes, clamped.pwm_minutes),
    ];
    for (parameter, computed, value) in pairs {
        // NaN never compares equal, so it is always reported.
        if computed != value {
            warn!(
                zone = %zone.zone_id,
                parameter,
                computed,
                clamped = value,
                "recommendation outside configured bounds, clamped"
            );
            corrections.push(BoundsCorrection {
                parameter: parameter.to_string(),
                computed,
                clamped: value,
            });
        }
    }
    clamped
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use thermlern_core::{Bounds, EnergyClass, HeatingType, PidBounds};

    fn zone() -> ZoneConfig {
        ZoneConfig::new(
            "living",
            30.0,
            HeatingType::Radiator,
            EnergyClass::B,
            PidBounds {
                kp: Bounds::new(0.1, 100.0),
                ki: Bounds::new(0.001, 10.0),
                kd: Bounds::new(0.0, 500.0),
            },
            Bounds::new(10.0, 60.0),
        )
    }

    fn current() -> ControllerSettings {
        ControllerSettings {
            gains: PidGains {
                kp: 10.0,
                ki: 1.0,
                kd: 50.0,
            },
            pwm_minutes: 30.0,
        }
    }

    fn measured(metrics: ResponseMetrics) -> ResponseOutcome {
        ResponseOutcome::Measured(ResponseMetrics {
            cycles_analyzed: 3,
            ..metrics
        })
    }

    fn run(metrics: ResponseMetrics) -> Adjustment {
        AdaptiveAdjustmentEngine::from_config(&LearningConfig::default()).adjust(
            &zone(),
            &RuleTable::default(),
            &measured(metrics),
            &CycleStatistics::default(),
            current(),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn large_overshoot_cuts_kp_and_ki() {
        let adj = run(ResponseMetrics {
            overshoot: Some(0.6),
            rise_time_minutes: Some(50.0),
            settling_time_minutes: Some(50.0),
            oscillation_count: Some(0.0),
            ..ResponseMetrics::default()
        });
        assert_eq!(adj.fired_rules, vec!["overshoot_major"]);
        assert!(close(adj.settings.gains.kp, 8.5));
        assert!(close(adj.settings.gains.ki, 0.925));
        assert!(close(adj.settings.gains.kd, 50.0));
        assert_eq!(adj.pwm_change, PwmChange::Unchanged);
    }

    #[test]
    fn undershoot_raises_ki() {
        let adj = run(ResponseMetrics {
            undershoot: Some(0.4),
            ..ResponseMetrics::default()
        });
        assert_eq!(adj.fired_rules, vec!["undershoot"]);
        assert!(close(adj.settings.gains.ki, 1.2));
        assert!(close(adj.settings.gains.kp, 10.0));
    }

    #[test]
    fn slow_rise_without_overshoot_raises_kp() {
        let adj = run(ResponseMetrics {
            overshoot: Some(0.0),
            rise_time_minutes: Some(70.0),
            settling_time_minutes: Some(0.0),
            oscillation_count: Some(0.0),
            ..ResponseMetrics::default()
        });
        assert_eq!(adj.fired_rules, vec!["slow_rise"]);
        assert!(close(adj.settings.gains.kp, 11.0));
    }

    #[test]
    fn oscillation_cuts_kp_raises_kd_and_shortens_pwm() {
        let adj = run(ResponseMetrics {
            overshoot: Some(0.15),
            rise_time_minutes: Some(40.0),
            settling_time_minutes: Some(25.0),
            oscillation_count: Some(4.0),
            ..ResponseMetrics::default()
        });
        assert_eq!(adj.fired_rules, vec!["oscillation_major"]);
        assert!(close(adj.settings.gains.kp, 9.0));
        assert!(close(adj.settings.gains.kd, 60.0));
        assert_eq!(adj.pwm_change, PwmChange::Shortened);
        assert!(close(adj.settings.pwm_minutes, 25.0));
    }

    #[test]
    fn composed_effects_are_capped() {
        let mut rules = RuleTable::default();
        rules.rules[0].effects[0].factor = 0.5;
        let adj = AdaptiveAdjustmentEngine::from_config(&LearningConfig::default()).adjust(
            &zone(),
            &rules,
            &measured(ResponseMetrics {
                overshoot: Some(0.9),
                ..ResponseMetrics::default()
            }),
            &CycleStatistics::default(),
            current(),
        );
        assert!(close(adj.factors.kp, 0.75));
        assert!(close(adj.settings.gains.kp, 7.5));
    }

    #[test]
    fn short_cycling_lengthens_pwm() {
        let stats = CycleStatistics {
            heating_cycles: 4,
            short_cycles: 3,
            ..CycleStatistics::default()
        };
        let adj = AdaptiveAdjustmentEngine::from_config(&LearningConfig::default()).adjust(
            &zone(),
            &RuleTable::default(),
            &measured(ResponseMetrics {
                oscillation_count: Some(5.0),
                ..ResponseMetrics::default()
            }),
            &stats,
            current(),
        );
        assert_eq!(adj.pwm_change, PwmChange::Lengthened);
        assert!(close(adj.settings.pwm_minutes, 35.0));
    }

    #[test]
    fn results_outside_bounds_are_clamped_and_reported() {
        let mut zone = zone();
        zone.pid_bounds.kp = Bounds::new(9.0, 20.0);
        let adj = AdaptiveAdjustmentEngine::from_config(&LearningConfig::default()).adjust(
            &zone,
            &RuleTable::default(),
            &measured(ResponseMetrics {
                overshoot: Some(0.6),
                ..ResponseMetrics::default()
            }),
            &CycleStatistics::default(),
            current(),
        );
        assert!(close(adj.settings.gains.kp, 9.0));
        assert_eq!(adj.bounds_corrections.len(), 1);
        assert_eq!(adj.bounds_corrections[0].parameter, "kp");
        assert!(close(adj.bounds_corrections[0].computed, 8.5));
    }

    #[test]
    fn insufficient_data_passes_current_through() {
        let adj = AdaptiveAdjustmentEngine::from_config(&LearningConfig::default()).adjust(
            &zone(),
            &RuleTable::default(),
            &ResponseOutcome::InsufficientData {
                analyzed: 2,
                required: 3,
            },
            &CycleStatistics::default(),
            current(),
        );
        assert_eq!(adj, Adjustment::unchanged(current()));
    }
}
