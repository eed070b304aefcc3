//! Sampled zone history as delivered by the history/recorder service.
//!
//! A [`Sample`] is one timestamped reading of the zone: room temperature,
//! optional outdoor temperature, heater output and the active setpoint.
//! Samples are only ever consumed through a [`SampleWindow`], which enforces
//! the ordering and value invariants every analysis stage relies on.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::DataError;

/// Heater drive as reported by the control loop.
///
/// Relay-driven zones report a switch state, modulating zones a level in
/// `[0, 1]`. Both forms are accepted on the wire (`true` / `0.35`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaterOutput {
    Switch(bool),
    Level(f64),
}

impl HeaterOutput {
    /// Output as a fraction of full power.
    #[must_use]
    pub fn level(self) -> f64 {
        match self {
            HeaterOutput::Switch(true) => 1.0,
            HeaterOutput::Switch(false) => 0.0,
            HeaterOutput::Level(level) => level,
        }
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        self.level() > 0.0
    }
}

/// One reading of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub room_temp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outdoor_temp: Option<f64>,
    pub heater_output: HeaterOutput,
    pub setpoint: f64,
    /// Set while a user override of the controller was active.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manual_override: bool,
}

impl Sample {
    /// Reading of a relay-driven zone without outdoor data.
    #[must_use]
    pub fn new(ts: OffsetDateTime, room_temp: f64, heater_on: bool, setpoint: f64) -> Self {
        Self {
            ts,
            room_temp,
            outdoor_temp: None,
            heater_output: HeaterOutput::Switch(heater_on),
            setpoint,
            manual_override: false,
        }
    }

    #[must_use]
    pub fn heater_active(&self) -> bool {
        self.heater_output.is_active()
    }
}

/// A validated, strictly time-ordered, non-empty run of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    samples: Vec<Sample>,
}

impl SampleWindow {
    /// Validates `samples` and takes ownership of them.
    ///
    /// Rejects empty input, duplicate or decreasing timestamps, non-finite
    /// temperatures or setpoints, and heater levels outside `[0, 1]`.
    pub fn new(samples: Vec<Sample>) -> Result<Self, DataError> {
        if samples.is_empty() {
            return Err(DataError::EmptyWindow);
        }

        for (index, sample) in samples.iter().enumerate() {
            if !sample.room_temp.is_finite() {
                return Err(DataError::NonFinite {
                    index,
                    field: "room_temp",
                });
            }
            if !sample.setpoint.is_finite() {
                return Err(DataError::NonFinite {
                    index,
                    field: "setpoint",
                });
            }
            if sample.outdoor_temp.is_some_and(|t| !t.is_finite()) {
                return Err(DataError::NonFinite {
                    index,
                    field: "outdoor_temp",
                });
            }
            let level = sample.heater_output.level();
            if !(0.0..=1.0).contains(&level) {
                return Err(DataError::OutputOutOfRange {
                    index,
                    value: level,
                });
            }
            if index > 0 {
                let previous = samples[index - 1].ts;
                if sample.ts == previous {
                    return Err(DataError::DuplicateTimestamp { index });
                }
                if sample.ts < previous {
                    return Err(DataError::NonMonotonic { index });
                }
            }
        }

        Ok(Self { samples })
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Windows are never empty once built; pairs with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn start(&self) -> OffsetDateTime {
        self.samples[0].ts
    }

    #[must_use]
    pub fn end(&self) -> OffsetDateTime {
        self.samples[self.samples.len() - 1].ts
    }

    #[must_use]
    pub fn span(&self) -> Duration {
        self.end() - self.start()
    }
}
