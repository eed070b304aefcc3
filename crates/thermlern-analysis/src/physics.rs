//! Physics-derived starting point for a zone.
//!
//! The thermal time constant is the ratio of the zone's effective thermal
//! mass to its heat-loss coefficient. Gains follow the Ziegler–Nichols
//! reaction-curve rules with a dead time proportional to τ, scaled down by a
//! per-heating-type conservatism multiplier:
//!
//! * `Kp = 1.2 · τ / (K · L)` in % output per °C
//! * `Ki = Kp / (2 · L)` in % per °C·h
//! * `Kd = Kp · 0.5 · L` in %·h per °C
//!
//! where `K` is the steady-state temperature rise at full output and `L` the
//! dead time in hours.

use serde::{Deserialize, Serialize};
use thermlern_core::{
    ConfigError, ControllerSettings, EnergyClass, HeatingType, Orientation, PidGains, RateEstimate,
    ThermalRates, ZoneConfig,
};

/// Glazing U-value in W/m²K.
const WINDOW_U_VALUE: f64 = 1.1;

/// Static thermal behaviour of one heating-element type.
#[derive(Debug, Clone, Copy)]
struct HeatingProfile {
    /// Effective heat capacity of the zone per m³ of air volume (Wh/m³K).
    capacity_wh_per_m3k: f64,
    /// Effective heat output per m² of floor area at full drive (W/m²).
    power_w_per_m2: f64,
    /// Dead time as a fraction of τ.
    dead_time_fraction: f64,
    /// Multiplier applied to all three gains; lower is more conservative.
    conservatism: f64,
    pwm_minutes: f64,
}

fn profile(heating_type: HeatingType) -> HeatingProfile {
    match heating_type {
        HeatingType::FloorHydronic => HeatingProfile {
            capacity_wh_per_m3k: 3.5,
            power_w_per_m2: 25.0,
            dead_time_fraction: 0.20,
            conservatism: 0.50,
            pwm_minutes: 90.0,
        },
        HeatingType::FloorElectric => HeatingProfile {
            capacity_wh_per_m3k: 3.0,
            power_w_per_m2: 40.0,
            dead_time_fraction: 0.15,
            conservatism: 0.60,
            pwm_minutes: 60.0,
        },
        HeatingType::Ceiling => HeatingProfile {
            capacity_wh_per_m3k: 2.5,
            power_w_per_m2: 30.0,
            dead_time_fraction: 0.12,
            conservatism: 0.70,
            pwm_minutes: 45.0,
        },
        HeatingType::Radiator => HeatingProfile {
            capacity_wh_per_m3k: 2.0,
            power_w_per_m2: 50.0,
            dead_time_fraction: 0.08,
            conservatism: 0.80,
            pwm_minutes: 30.0,
        },
        HeatingType::Convector => HeatingProfile {
            capacity_wh_per_m3k: 1.5,
            power_w_per_m2: 60.0,
            dead_time_fraction: 0.05,
            conservatism: 0.90,
            pwm_minutes: 15.0,
        },
    }
}

/// Envelope U-value per m² of floor area (W/m²K).
fn envelope_u_value(class: EnergyClass) -> f64 {
    match class {
        EnergyClass::APlus3 => 0.15,
        EnergyClass::APlus2 => 0.20,
        EnergyClass::APlus => 0.25,
        EnergyClass::A => 0.35,
        EnergyClass::B => 0.50,
        EnergyClass::C => 0.70,
        EnergyClass::D => 0.90,
        EnergyClass::E => 1.10,
        EnergyClass::F => 1.30,
        EnergyClass::G => 1.60,
    }
}

/// Loss weighting of glazing: north-facing glass loses most, south-facing
/// glass is partly offset by solar gain.
fn orientation_factor(orientation: Orientation) -> f64 {
    match orientation {
        Orientation::North => 1.2,
        Orientation::East | Orientation::West | Orientation::Mixed => 1.0,
        Orientation::South => 0.8,
    }
}

/// Result of the physics model for one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBaseline {
    pub tau_hours: f64,
    pub thermal_mass_wh_per_k: f64,
    pub heat_loss_w_per_k: f64,
    pub gains: PidGains,
    pub pwm_minutes: f64,
    /// Expected rates before anything was measured.
    pub rates: ThermalRates,
}

impl PhysicsBaseline {
    /// Derives the baseline from static configuration.
    ///
    /// `design_delta_c` is the indoor/outdoor difference assumed for the
    /// rate estimates. Fails only on structurally invalid configuration.
    pub fn derive(zone: &ZoneConfig, design_delta_c: f64) -> Result<Self, ConfigError> {
        zone.validate()?;

        let profile = profile(zone.heating_type);
        let thermal_mass = zone.volume_m3() * profile.capacity_wh_per_m3k;
        let heat_loss = envelope_u_value(zone.energy_class) * zone.area_m2
            + zone.window_area_m2 * WINDOW_U_VALUE * orientation_factor(zone.window_orientation);
        let tau_hours = thermal_mass / heat_loss;

        let power_w = profile.power_w_per_m2 * zone.area_m2;
        let steady_state_rise = power_w / heat_loss;
        let dead_time_hours = tau_hours * profile.dead_time_fraction;

        let kp = 1.2 * tau_hours / (steady_state_rise * dead_time_hours) * 100.0;
        let ki = kp / (2.0 * dead_time_hours);
        let kd = kp * 0.5 * dead_time_hours;

        let raw = PidGains {
            kp: kp * profile.conservatism,
            ki: ki * profile.conservatism,
            kd: kd * profile.conservatism,
        };
        let gains = zone.pid_bounds.clamp(raw);
        let pwm_minutes = zone.pwm_bounds.clamp(profile.pwm_minutes);

        let loss_rate = design_delta_c / tau_hours;
        let heat_rate = (power_w / thermal_mass - loss_rate).max(0.0);

        Ok(Self {
            tau_hours,
            thermal_mass_wh_per_k: thermal_mass,
            heat_loss_w_per_k: heat_loss,
            gains,
            pwm_minutes,
            rates: ThermalRates {
                heat_rate_c_per_hour: Some(RateEstimate::physics(heat_rate)),
                cool_rate_c_per_hour: Some(RateEstimate::physics(loss_rate)),
            },
        })
    }

    #[must_use]
    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            gains: self.gains,
            pwm_minutes: self.pwm_minutes,
        }
    }
}
