use thiserror::Error;

/// Invalid static zone configuration. Fatal to the run, the record stays as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("zone '{zone}': {field} must be positive and finite (got {value})")]
    NonPositiveGeometry {
        zone: String,
        field: &'static str,
        value: f64,
    },
    #[error("unknown heating type: {0}")]
    UnknownHeatingType(String),
    #[error("zone '{zone}': invalid {name} bounds [{min}, {max}]")]
    InvalidBounds {
        zone: String,
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("zone '{zone}': {reason}")]
    Invalid { zone: String, reason: String },
    #[error("learning configuration: {0}")]
    Learning(String),
}

/// Malformed or missing input data. The run aborts and the zone degrades.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("sample window is empty")]
    EmptyWindow,
    #[error("duplicate timestamp at sample {index}")]
    DuplicateTimestamp { index: usize },
    #[error("timestamps not increasing at sample {index}")]
    NonMonotonic { index: usize },
    #[error("sample {index}: {field} is not finite")]
    NonFinite { index: usize, field: &'static str },
    #[error("sample {index}: heater output {value} outside [0, 1]")]
    OutputOutOfRange { index: usize, value: f64 },
    #[error("required sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("history unavailable: {0}")]
    SourceUnavailable(String),
}

#[derive(Debug, Error)]
pub enum LearningError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("commit rejected: {0}")]
    Commit(String),
}

pub type Result<T> = std::result::Result<T, LearningError>;
