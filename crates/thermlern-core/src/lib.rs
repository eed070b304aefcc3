//! Shared data model for thermlern: zone configuration, sampled history,
//! heating cycles, response metrics and the per-zone learning record.

pub mod config;
pub mod cycle;
pub mod error;
pub mod record;
pub mod rules;
pub mod sample;
pub mod zone;

pub use config::LearningConfig;
pub use cycle::{Contamination, CycleEvent, CycleKind, RateEstimate, RateSource, ResponseMetrics, ThermalRates};
pub use error::{ConfigError, DataError, LearningError, Result};
pub use record::{ControllerSettings, LearningRecord, LearningState, RECORD_SCHEMA_VERSION};
pub use rules::{Condition, Effect, Gain, Metric, Rule, RuleTable};
pub use sample::{HeaterOutput, Sample, SampleWindow};
pub use zone::{Bounds, EnergyClass, HeatingType, Orientation, PidBounds, PidGains, ZoneConfig};

/// Converts a minute count from configuration into a [`time::Duration`].
#[must_use]
pub fn minutes(value: f64) -> time::Duration {
    time::Duration::seconds_f64(value * 60.0)
}

/// Whole and fractional minutes of a [`time::Duration`].
#[must_use]
pub fn as_minutes(duration: time::Duration) -> f64 {
    duration.as_seconds_f64() / 60.0
}
