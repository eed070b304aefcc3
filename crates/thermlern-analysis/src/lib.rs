//! Turns a zone's configuration and sampled history into the signals the
//! adaptive layer consumes: a physics baseline, heating/idle cycles,
//! step-response metrics and thermal rates.
#![warn(clippy::unwrap_used, clippy::expect_used)]

pub mod cycles;
pub mod physics;
pub mod rates;
pub mod response;

pub use cycles::{CycleExtractor, CycleStatistics};
pub use physics::PhysicsBaseline;
pub use rates::{ThermalRateEstimator, MIN_RATE_SAMPLES};
pub use response::{CycleResponse, ResponseAnalysis, ResponseAnalyzer, ResponseOutcome};
