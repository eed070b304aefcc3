//! The per-zone learning record and its persisted form.
//!
//! Records are stored as versioned JSON. Reading is forward compatible:
//! unknown fields are ignored and missing fields fall back to the
//! [`LearningState::Uninitialized`] defaults.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::cycle::{ResponseMetrics, ThermalRates};
use crate::zone::{PidGains, ZoneConfig};

/// Schema version written with every record.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningState {
    #[default]
    Uninitialized,
    Learning,
    Tuned,
    Degraded,
}

impl LearningState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LearningState::Uninitialized => "uninitialized",
            LearningState::Learning => "learning",
            LearningState::Tuned => "tuned",
            LearningState::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for LearningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PID gains plus PWM period: everything the control loop needs to apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerSettings {
    pub gains: PidGains,
    pub pwm_minutes: f64,
}

impl ControllerSettings {
    #[must_use]
    pub fn within_bounds(&self, zone: &ZoneConfig) -> bool {
        zone.pid_bounds.contains(&self.gains) && zone.pwm_bounds.contains(self.pwm_minutes)
    }

    #[must_use]
    pub fn clamped_to(&self, zone: &ZoneConfig) -> ControllerSettings {
        ControllerSettings {
            gains: zone.pid_bounds.clamp(self.gains),
            pwm_minutes: zone.pwm_bounds.clamp(self.pwm_minutes),
        }
    }
}

/// Everything learned about one zone. Owned exclusively by the state store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningRecord {
    /// `0` for records written before versioning.
    pub schema_version: u32,
    pub state: LearningState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ResponseMetrics>,
    pub rates: ThermalRates,
    pub analyzed_event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended: Option<ControllerSettings>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation_reason: Option<String>,
}

impl LearningRecord {
    /// A fresh record at the current schema version.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_newer_schema(&self) -> bool {
        self.schema_version > RECORD_SCHEMA_VERSION
    }
}
