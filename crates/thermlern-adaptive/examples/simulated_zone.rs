//! Runs two learning passes over a simulated floor-heated zone.
//!
//! The zone is a two-node model (slab and room air) switched by a plain
//! hysteresis thermostat, which overshoots the way slow floor heating does.
//!
//! Run with: cargo run -p thermlern-adaptive --example simulated_zone

use std::error::Error;
use std::sync::Arc;

use thermlern_adaptive::{HvacMode, LearningEngine, LearningStateStore, RunRequest};
use thermlern_core::{
    Bounds, EnergyClass, HeatingType, LearningConfig, PidBounds, Sample, ZoneConfig,
};
use time::{Duration, OffsetDateTime};

const SETPOINT: f64 = 21.0;
const HYSTERESIS: f64 = 0.4;
const OUTDOOR: f64 = 2.0;
const STEP_MINUTES: i64 = 5;

fn simulate(start: OffsetDateTime, days: i64) -> Vec<Sample> {
    let steps = days * 24 * 60 / STEP_MINUTES;
    let dt_h = STEP_MINUTES as f64 / 60.0;
    let (mut slab, mut room) = (20.0_f64, 20.0_f64);
    let mut heating = false;

    (0..steps)
        .map(|i| {
            if room < SETPOINT - HYSTERESIS {
                heating = true;
            } else if room >= SETPOINT {
                heating = false;
            }
            let supply = if heating { 6.0 } else { 0.0 };
            slab += dt_h * (supply - 0.8 * (slab - room));
            room += dt_h * (0.8 * (slab - room) - 0.05 * (room - OUTDOOR));

            Sample::new(
                start + Duration::minutes(i * STEP_MINUTES),
                (room * 100.0).round() / 100.0,
                heating,
                SETPOINT,
            )
        })
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    let zone = ZoneConfig::new(
        "living_room",
        32.0,
        HeatingType::FloorHydronic,
        EnergyClass::B,
        PidBounds {
            kp: Bounds::new(0.5, 60.0),
            ki: Bounds::new(0.01, 5.0),
            kd: Bounds::new(0.5, 400.0),
        },
        Bounds::new(15.0, 120.0),
    );
    let engine = LearningEngine::new(LearningConfig::default(), Arc::new(LearningStateStore::new()))?;

    let start = OffsetDateTime::UNIX_EPOCH + Duration::days(20_000);
    for (pass, days) in [(1, 1), (2, 3)] {
        let samples = simulate(start, days);
        let report = engine.run_zone(RunRequest {
            zone: &zone,
            samples: Ok(samples),
            applied: None,
            mode: HvacMode::Heat,
            now: start + Duration::days(days),
        })?;
        println!("pass {pass} ({days} d): {:?} -> {}", report.outcome, report.state);
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
