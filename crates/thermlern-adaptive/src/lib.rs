#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Adaptive PID/PWM tuning and per-zone learning state.
//!
//! The analysis crate measures; this crate decides. A [`LearningEngine`] run
//! turns one zone's window into a new [`LearningRecord`](thermlern_core::LearningRecord)
//! and commits it to the [`LearningStateStore`], the only place records are
//! written. Recommendations are proposals: the control loop decides when to
//! apply them.

pub mod adjust;
pub mod engine;
pub mod health;
pub mod store;

pub use adjust::{evaluate, AdaptiveAdjustmentEngine, Adjustment, BoundsCorrection, GainFactors, PwmChange};
pub use engine::{HvacMode, LearningEngine, RunOutcome, RunReport, RunRequest};
pub use health::{HealthStatus, ZoneHealth};
pub use store::{LearningStateStore, RecordFile};
