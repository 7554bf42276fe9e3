//! hpa-core — shared types for the hpa autoscaling control loop.
//!
//! Everything the other crates exchange lives here: replica identifiers,
//! utilization samples, scaling decisions, per-cycle events, the
//! `hpad.toml` configuration, and the error taxonomy.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Aggregation, AutoscalerConfig, HpadConfig, parse_duration};
pub use error::{ConfigError, ScaleError, ScaleResult};
pub use types::*;
