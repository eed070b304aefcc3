//! Static per-zone configuration as supplied by the zone configuration provider.
//!
//! A [`ZoneConfig`] is immutable for the duration of a learning run. It is
//! passed explicitly to every stage; nothing in thermlern looks configuration
//! up from process-wide state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::rules::RuleTable;

const DEFAULT_CEILING_HEIGHT_M: f64 = 2.5;
const DEFAULT_MIN_LEARNING_EVENTS: usize = 3;
const DEFAULT_LEARNING_WINDOW_DAYS: u32 = 7;
const DEFAULT_SHORT_CYCLE_MINUTES: f64 = 15.0;
const DEFAULT_VERY_SHORT_CYCLE_MINUTES: f64 = 5.0;

/// Heating element installed in a zone.
///
/// Deserialized from its snake_case name; an unrecognized name surfaces as
/// [`ConfigError::UnknownHeatingType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HeatingType {
    FloorHydronic,
    FloorElectric,
    Radiator,
    Convector,
    Ceiling,
}

impl HeatingType {
    pub const ALL: [HeatingType; 5] = [
        HeatingType::FloorHydronic,
        HeatingType::FloorElectric,
        HeatingType::Radiator,
        HeatingType::Convector,
        HeatingType::Ceiling,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HeatingType::FloorHydronic => "floor_hydronic",
            HeatingType::FloorElectric => "floor_electric",
            HeatingType::Radiator => "radiator",
            HeatingType::Convector => "convector",
            HeatingType::Ceiling => "ceiling",
        }
    }
}

impl FromStr for HeatingType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeatingType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownHeatingType(s.to_string()))
    }
}

impl TryFrom<String> for HeatingType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HeatingType> for String {
    fn from(value: HeatingType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for HeatingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Building energy-efficiency class, best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyClass {
    #[serde(rename = "A+++")]
    APlus3,
    #[serde(rename = "A++")]
    APlus2,
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl EnergyClass {
    pub const ALL: [EnergyClass; 10] = [
        EnergyClass::APlus3,
        EnergyClass::APlus2,
        EnergyClass::APlus,
        EnergyClass::A,
        EnergyClass::B,
        EnergyClass::C,
        EnergyClass::D,
        EnergyClass::E,
        EnergyClass::F,
        EnergyClass::G,
    ];
}

/// Dominant orientation of a zone's glazing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    North,
    East,
    South,
    West,
    #[default]
    Mixed,
}

/// Closed interval a tuned value must stay within.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min >= 0.0 && self.min <= self.max
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clamps `value` into the interval. Non-finite input lands on the lower bound.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.min
        }
    }

    fn check(&self, zone: &str, name: &'static str) -> Result<(), ConfigError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ConfigError::InvalidBounds {
                zone: zone.to_string(),
                name,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidBounds {
    pub kp: Bounds,
    pub ki: Bounds,
    pub kd: Bounds,
}

impl PidBounds {
    #[must_use]
    pub fn clamp(&self, gains: PidGains) -> PidGains {
        PidGains {
            kp: self.kp.clamp(gains.kp),
            ki: self.ki.clamp(gains.ki),
            kd: self.kd.clamp(gains.kd),
        }
    }

    #[must_use]
    pub fn contains(&self, gains: &PidGains) -> bool {
        self.kp.contains(gains.kp) && self.ki.contains(gains.ki) && self.kd.contains(gains.kd)
    }
}

/// Static description of one heating zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub zone_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub area_m2: f64,
    /// Takes precedence over `area_m2 * ceiling_height_m` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_m3: Option<f64>,
    #[serde(default = "default_ceiling_height")]
    pub ceiling_height_m: f64,
    #[serde(default)]
    pub window_area_m2: f64,
    #[serde(default)]
    pub window_orientation: Orientation,
    pub heating_type: HeatingType,
    pub energy_class: EnergyClass,
    pub pid_bounds: PidBounds,
    /// PWM period bounds in minutes.
    pub pwm_bounds: Bounds,
    #[serde(default = "default_min_learning_events")]
    pub min_learning_events: usize,
    #[serde(default = "default_learning_window_days")]
    pub learning_window_days: u32,
    #[serde(default = "default_short_cycle_minutes")]
    pub short_cycle_warning_minutes: f64,
    #[serde(default = "default_very_short_cycle_minutes")]
    pub very_short_cycle_minutes: f64,
    /// Replaces the default adjustment rule table for this zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<RuleTable>,
}

fn default_ceiling_height() -> f64 {
    DEFAULT_CEILING_HEIGHT_M
}

fn default_min_learning_events() -> usize {
    DEFAULT_MIN_LEARNING_EVENTS
}

fn default_learning_window_days() -> u32 {
    DEFAULT_LEARNING_WINDOW_DAYS
}

fn default_short_cycle_minutes() -> f64 {
    DEFAULT_SHORT_CYCLE_MINUTES
}

fn default_very_short_cycle_minutes() -> f64 {
    DEFAULT_VERY_SHORT_CYCLE_MINUTES
}

impl ZoneConfig {
    /// Minimal configuration with default learning parameters.
    #[must_use]
    pub fn new(
        zone_id: impl Into<String>,
        area_m2: f64,
        heating_type: HeatingType,
        energy_class: EnergyClass,
        pid_bounds: PidBounds,
        pwm_bounds: Bounds,
    ) -> Self {
        Self {
            zone_id: zone_id.into(),
            display_name: None,
            area_m2,
            volume_m3: None,
            ceiling_height_m: DEFAULT_CEILING_HEIGHT_M,
            window_area_m2: 0.0,
            window_orientation: Orientation::default(),
            heating_type,
            energy_class,
            pid_bounds,
            pwm_bounds,
            min_learning_events: DEFAULT_MIN_LEARNING_EVENTS,
            learning_window_days: DEFAULT_LEARNING_WINDOW_DAYS,
            short_cycle_warning_minutes: DEFAULT_SHORT_CYCLE_MINUTES,
            very_short_cycle_minutes: DEFAULT_VERY_SHORT_CYCLE_MINUTES,
            rules: None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.zone_id)
    }

    /// Air volume in m³, derived from floor area and ceiling height when not given.
    #[must_use]
    pub fn volume_m3(&self) -> f64 {
        self.volume_m3
            .unwrap_or(self.area_m2 * self.ceiling_height_m)
    }

    /// Structural validation: positive geometry, well-formed bounds and rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::NonPositiveGeometry {
                    zone: self.zone_id.clone(),
                    field,
                    value,
                })
            }
        };

        positive("area_m2", self.area_m2)?;
        positive("ceiling_height_m", self.ceiling_height_m)?;
        if let Some(volume) = self.volume_m3 {
            positive("volume_m3", volume)?;
        }
        if !self.window_area_m2.is_finite() || self.window_area_m2 < 0.0 {
            return Err(ConfigError::NonPositiveGeometry {
                zone: self.zone_id.clone(),
                field: "window_area_m2",
                value: self.window_area_m2,
            });
        }

        self.pid_bounds.kp.check(&self.zone_id, "kp")?;
        self.pid_bounds.ki.check(&self.zone_id, "ki")?;
        self.pid_bounds.kd.check(&self.zone_id, "kd")?;
        self.pwm_bounds.check(&self.zone_id, "pwm")?;
        if self.pwm_bounds.min <= 0.0 {
            return Err(ConfigError::InvalidBounds {
                zone: self.zone_id.clone(),
                name: "pwm",
                min: self.pwm_bounds.min,
                max: self.pwm_bounds.max,
            });
        }

        if self.min_learning_events == 0 {
            return Err(self.invalid("min_learning_events must be at least 1"));
        }
        if self.learning_window_days == 0 {
            return Err(self.invalid("learning_window_days must be at least 1"));
        }
        if !(self.short_cycle_warning_minutes.is_finite()
            && self.very_short_cycle_minutes.is_finite()
            && self.very_short_cycle_minutes <= self.short_cycle_warning_minutes)
        {
            return Err(self.invalid("very_short_cycle_minutes must not exceed short_cycle_warning_minutes"));
        }
        if let Some(rules) = &self.rules {
            rules
                .validate()
                .map_err(|reason| self.invalid(&reason))?;
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::Invalid {
            zone: self.zone_id.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bounds() -> PidBounds {
        PidBounds {
            kp: Bounds::new(0.1, 10.0),
            ki: Bounds::new(0.001, 1.0),
            kd: Bounds::new(0.0, 50.0),
        }
    }

    #[test]
    fn volume_falls_back_to_area_times_height() {
        let mut zone = ZoneConfig::new(
            "gf",
            40.0,
            HeatingType::FloorHydronic,
            EnergyClass::A,
            bounds(),
            Bounds::new(10.0, 120.0),
        );
        assert!((zone.volume_m3() - 100.0).abs() < 1e-9);
        zone.volume_m3 = Some(85.0);
        assert!((zone.volume_m3() - 85.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_geometry() {
        let zone = ZoneConfig::new(
            "gf",
            0.0,
            HeatingType::Radiator,
            EnergyClass::B,
            bounds(),
            Bounds::new(10.0, 120.0),
        );
        let err = zone.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NonPositiveGeometry { field: "area_m2", .. }
        ));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut zone = ZoneConfig::new(
            "gf",
            20.0,
            HeatingType::Radiator,
            EnergyClass::B,
            bounds(),
            Bounds::new(10.0, 120.0),
        );
        zone.pid_bounds.ki = Bounds::new(1.0, 0.5);
        assert!(matches!(
            zone.validate(),
            Err(ConfigError::InvalidBounds { name: "ki", .. })
        ));
    }

    #[test]
    fn unknown_heating_type_is_a_config_error() {
        assert_eq!(
            "heat_pump".parse::<HeatingType>(),
            Err(ConfigError::UnknownHeatingType("heat_pump".to_string()))
        );

        let raw = json!({
            "zone_id": "gf",
            "area_m2": 30.0,
            "heating_type": "heat_pump",
            "energy_class": "A+++",
            "pid_bounds": {
                "kp": {"min": 0.1, "max": 10.0},
                "ki": {"min": 0.001, "max": 1.0},
                "kd": {"min": 0.0, "max": 50.0}
            },
            "pwm_bounds": {"min": 10.0, "max": 120.0}
        });
        let err = serde_json::from_value::<ZoneConfig>(raw).unwrap_err();
        assert!(err.to_string().contains("unknown heating type"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let raw = json!({
            "zone_id": "bathroom",
            "area_m2": 8.5,
            "heating_type": "floor_electric",
            "energy_class": "A++",
            "window_orientation": "north",
            "pid_bounds": {
                "kp": {"min": 0.1, "max": 10.0},
                "ki": {"min": 0.001, "max": 1.0},
                "kd": {"min": 0.0, "max": 50.0}
            },
            "pwm_bounds": {"min": 10.0, "max": 120.0}
        });
        let zone: ZoneConfig = serde_json::from_value(raw).expect("zone should parse");
        assert_eq!(zone.heating_type, HeatingType::FloorElectric);
        assert_eq!(zone.energy_class, EnergyClass::APlus2);
        assert_eq!(zone.window_orientation, Orientation::North);
        assert_eq!(zone.min_learning_events, 3);
        assert_eq!(zone.learning_window_days, 7);
        assert!(zone.rules.is_none());
        zone.validate().expect("defaults are valid");
    }
}
