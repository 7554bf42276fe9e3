//! hpa-metrics — utilization signals for the control loop.
//!
//! Defines the [`MetricSource`] capability the controller samples once per
//! cycle, plus two implementations and the Prometheus exposition of the
//! controller's status.
//!
//! # Architecture
//!
//! ```text
//! MetricSource (trait)
//!   ├── FeedMetricSource   ← samples pushed by an external telemetry feed
//!   └── ProbeMetricSource  ← concurrent fan-out over a ReplicaProbe
//!
//! aggregate() → one utilization value per cycle (mean or max)
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod feed;
pub mod probe;
pub mod prometheus;
pub mod source;

pub use feed::FeedMetricSource;
pub use probe::{ProbeFuture, ProbeMetricSource, ReplicaProbe};
pub use prometheus::render_prometheus;
pub use source::{MetricSource, SampleFuture, SampleMap, aggregate};
