//! The metric source capability and per-cycle aggregation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use hpa_core::{Aggregation, ReplicaId, ScaleResult, UtilizationSample};

/// Samples keyed by the replica that reported them.
pub type SampleMap = HashMap<ReplicaId, UtilizationSample>;

/// Boxed future returned by [`MetricSource::sample`].
pub type SampleFuture<'a> = Pin<Box<dyn Future<Output = ScaleResult<SampleMap>> + Send + 'a>>;

/// Supplies utilization samples for the replicas of one workload.
///
/// Called once per control cycle with the replica set the controller just
/// re-read from the pool. Implementations may return a partial mapping;
/// replicas absent from it are excluded from the average rather than
/// counted as zero. When no replica reports, implementations return
/// [`hpa_core::ScaleError::MetricUnavailable`].
pub trait MetricSource: Send + Sync {
    fn sample<'a>(&'a self, replicas: &'a [ReplicaId]) -> SampleFuture<'a>;
}

/// Combine per-replica samples into a single utilization value.
///
/// Returns `None` when there is nothing to combine.
pub fn aggregate(samples: &SampleMap, aggregation: Aggregation) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let values = samples.values().map(|s| s.value);
    match aggregation {
        Aggregation::Mean => Some(values.sum::<f64>() / samples.len() as f64),
        Aggregation::Max => values.reduce(f64::max),
    }
}
