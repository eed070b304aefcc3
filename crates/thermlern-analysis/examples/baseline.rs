//! Reads a zone configuration as JSON from stdin and prints its physics
//! baseline.
//!
//! ```text
//! echo '{"zone_id":"bath","area_m2":8,"heating_type":"floor_electric",
//!        "energy_class":"B","pid_bounds":{"kp":{"min":0.5,"max":8},
//!        "ki":{"min":0.01,"max":0.5},"kd":{"min":0.5,"max":20}},
//!        "pwm_bounds":{"min":10,"max":60}}' | cargo run --example baseline
//! ```

use std::io::{self, Read};

use serde::Serialize;
use thermlern_analysis::PhysicsBaseline;
use thermlern_core::{LearningConfig, ZoneConfig};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Serialize)]
struct BaselineRecord {
    ts: String,
    zone_id: String,
    baseline: PhysicsBaseline,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;

    let zone: ZoneConfig = serde_json::from_str(&input)?;
    let baseline = PhysicsBaseline::derive(&zone, LearningConfig::default().design_delta_c)?;

    let record = BaselineRecord {
        ts: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string()),
        zone_id: zone.zone_id,
        baseline,
    };

    serde_json::to_writer_pretty(io::stdout(), &record)?;
    println!();
    Ok(())
}
