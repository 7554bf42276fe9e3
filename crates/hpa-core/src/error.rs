//! Error types for the control loop and its configuration.

use thiserror::Error;

/// Result type alias for pool and metric operations.
pub type ScaleResult<T> = Result<T, ScaleError>;

/// Errors that can occur during a control cycle.
///
/// None of these are fatal to the controller; every variant degrades to
/// "hold current size" for the cycle in which it occurs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScaleError {
    #[error("no replica reported a utilization sample")]
    MetricUnavailable,

    #[error("a scale operation is already in progress")]
    ScaleInProgress,

    #[error("requested size {requested} outside [{min}, {max}]")]
    ScaleOutOfBounds { requested: u32, min: u32, max: u32 },

    #[error("pool backend error: {0}")]
    PoolBackendError(String),
}

impl ScaleError {
    /// Short machine-readable name, used in events and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ScaleError::MetricUnavailable => "metric_unavailable",
            ScaleError::ScaleInProgress => "scale_in_progress",
            ScaleError::ScaleOutOfBounds { .. } => "scale_out_of_bounds",
            ScaleError::PoolBackendError(_) => "pool_backend_error",
        }
    }
}

/// Errors produced while loading or validating `hpad.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for `{field}`: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
