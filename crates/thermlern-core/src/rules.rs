//! Declarative adjustment rules.
//!
//! A [`RuleTable`] is evaluated top to bottom on every run. Every rule whose
//! conditions all hold fires, and the factors of all fired effects on the
//! same gain multiply. Per-zone tables replace the default through
//! [`ZoneConfig::rules`](crate::ZoneConfig::rules).

use serde::{Deserialize, Serialize};

/// Aggregated response metric a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Overshoot,
    Undershoot,
    RiseTime,
    SettlingTime,
    OscillationCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gain {
    Kp,
    Ki,
    Kd,
}

/// Test on one metric.
///
/// A metric without a measurement never satisfies `Above` and always
/// satisfies `AtMost`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Above { metric: Metric, threshold: f64 },
    AtMost { metric: Metric, threshold: f64 },
}

impl Condition {
    #[must_use]
    pub fn holds(&self, value: Option<f64>) -> bool {
        match (*self, value) {
            (Condition::Above { threshold, .. }, Some(v)) => v > threshold,
            (Condition::Above { .. }, None) => false,
            (Condition::AtMost { threshold, .. }, Some(v)) => v <= threshold,
            (Condition::AtMost { .. }, None) => true,
        }
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        match *self {
            Condition::Above { metric, .. } | Condition::AtMost { metric, .. } => metric,
        }
    }
}

/// Multiplicative change to one gain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub gain: Gain,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub when: Vec<Condition>,
    pub effects: Vec<Effect>,
}

impl Rule {
    fn new(name: &str, when: Vec<Condition>, effects: Vec<Effect>) -> Self {
        Self {
            name: name.to_string(),
            when,
            effects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    pub rules: Vec<Rule>,
}

/// Largest Kp cut for significant overshoot; Ki is cut by half of it.
const OVERSHOOT_MAJOR_CUT: f64 = 0.15;
const OVERSHOOT_MINOR_CUT: f64 = 0.05;
const SLOW_RISE_BOOST: f64 = 0.10;
const UNDERSHOOT_KI_BOOST: f64 = 0.20;
const OSCILLATION_KP_CUT: f64 = 0.10;
const OSCILLATION_KD_BOOST: f64 = 0.20;
const MINOR_OSCILLATION_KD_BOOST: f64 = 0.10;
const SLOW_SETTLING_KD_BOOST: f64 = 0.15;
/// Overshoot at or below this counts as none.
const OVERSHOOT_NEGLIGIBLE_C: f64 = 0.05;

fn above(metric: Metric, threshold: f64) -> Condition {
    Condition::Above { metric, threshold }
}

fn at_most(metric: Metric, threshold: f64) -> Condition {
    Condition::AtMost { metric, threshold }
}

fn effect(gain: Gain, factor: f64) -> Effect {
    Effect { gain, factor }
}

impl Default for RuleTable {
    fn default() -> Self {
        use Gain::{Kd, Ki, Kp};
        use Metric::{OscillationCount, Overshoot, RiseTime, SettlingTime, Undershoot};

        Self {
            rules: vec![
                Rule::new(
                    "overshoot_major",
                    vec![above(Overshoot, 0.5)],
                    vec![
                        effect(Kp, 1.0 - OVERSHOOT_MAJOR_CUT),
                        effect(Ki, 1.0 - OVERSHOOT_MAJOR_CUT * 0.5),
                    ],
                ),
                Rule::new(
                    "overshoot_minor",
                    vec![above(Overshoot, 0.2), at_most(Overshoot, 0.5)],
                    vec![effect(Kp, 1.0 - OVERSHOOT_MINOR_CUT)],
                ),
                Rule::new(
                    "slow_rise",
                    vec![above(RiseTime, 60.0), at_most(Overshoot, OVERSHOOT_NEGLIGIBLE_C)],
                    vec![effect(Kp, 1.0 + SLOW_RISE_BOOST)],
                ),
                Rule::new(
                    "undershoot",
                    vec![above(Undershoot, 0.3)],
                    vec![effect(Ki, 1.0 + UNDERSHOOT_KI_BOOST)],
                ),
                Rule::new(
                    "oscillation_major",
                    vec![above(OscillationCount, 3.0)],
                    vec![
                        effect(Kp, 1.0 - OSCILLATION_KP_CUT),
                        effect(Kd, 1.0 + OSCILLATION_KD_BOOST),
                    ],
                ),
                Rule::new(
                    "oscillation_minor",
                    vec![above(OscillationCount, 1.0), at_most(OscillationCount, 3.0)],
                    vec![effect(Kd, 1.0 + MINOR_OSCILLATION_KD_BOOST)],
                ),
                Rule::new(
                    "slow_settling",
                    vec![above(SettlingTime, 90.0)],
                    vec![effect(Kd, 1.0 + SLOW_SETTLING_KD_BOOST)],
                ),
            ],
        }
    }
}

impl RuleTable {
    /// Every factor must be positive and finite, every rule named.
    pub fn validate(&self) -> Result<(), String> {
        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                return Err("rule without a name".to_string());
            }
            for e in &rule.effects {
                if !(e.factor.is_finite() && e.factor > 0.0) {
                    return Err(format!(
                        "rule '{}': factor {} for {:?} must be positive",
                        rule.name, e.factor, e.gain
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid_and_ordered() {
        let table = RuleTable::default();
        table.validate().expect("default table should validate");
        let names: Vec<&str> = table.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "overshoot_major",
                "overshoot_minor",
                "slow_rise",
                "undershoot",
                "oscillation_major",
                "oscillation_minor",
                "slow_settling"
            ]
        );
    }

    #[test]
    fn missing_metric_semantics() {
        let above = Condition::Above {
            metric: Metric::Overshoot,
            threshold: 0.2,
        };
        let at_most = Condition::AtMost {
            metric: Metric::Overshoot,
            threshold: 0.05,
        };
        assert!(!above.holds(None));
        assert!(at_most.holds(None));
        assert!(above.holds(Some(0.3)));
        assert!(!at_most.holds(Some(0.3)));
    }

    #[test]
    fn table_parses_from_json() {
        let json = r#"[
            {
                "name": "gentle_overshoot",
                "when": [{"kind": "above", "metric": "overshoot", "threshold": 0.4}],
                "effects": [{"gain": "kp", "factor": 0.97}]
            }
        ]"#;
        let table: RuleTable = serde_json::from_str(json).expect("table should parse");
        assert_eq!(table.rules.len(), 1);
        assert_eq!(table.rules[0].effects[0].gain, Gain::Kp);

        let bad: RuleTable = serde_json::from_str(
            r#"[{"name": "x", "when": [], "effects": [{"gain": "ki", "factor": -1.0}]}]"#,
        )
        .expect("shape is valid");
        assert!(bad.validate().is_err());
    }
}
