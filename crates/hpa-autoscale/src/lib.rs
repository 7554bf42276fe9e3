//! hpa-autoscale — utilization-driven replica scaling.
//!
//! Samples a [`MetricSource`](hpa_metrics::MetricSource) once per cycle,
//! asks the [`ScalingPolicy`] for a desired size, and applies it to a
//! [`ResourcePool`](hpa_pool::ResourcePool) when the cooldown for that
//! direction has elapsed.
//!
//! # Scaling Algorithm
//!
//! ```text
//! average = mean (or max) utilization of reporting replicas
//! target  = target_utilization
//!
//! desired = ceil(current * average / target)
//! desired = clamp(desired, min_replicas, max_replicas)
//!
//! if desired > current and now - last_scale_up   >= scale_up_cooldown:
//!     ScaleTo(desired)
//! if desired < current and now - last_scale_down >= scale_down_cooldown:
//!     ScaleTo(desired)
//! ```
//!
//! Cooldown windows prevent flapping under noisy metrics. Missing metrics,
//! a sampling timeout, or any pool error hold the current size.
//!
//! # Control cycle
//!
//! ```text
//! Idle ──tick──▶ Sampling ──samples──▶ Deciding ──change + cooldown ok──▶ Applying
//!  ▲                │ no samples          │ no change / cooling down        │
//!  └────────────────┴─────────────────────┴─────────────────────────────────┘
//! ```

pub mod controller;
pub mod events;
pub mod policy;

pub use controller::{Controller, ControllerHandle};
pub use events::EventLog;
pub use policy::{ScalingPolicy, decide};
