//! Feed metric source: utilization pushed by an external telemetry feed.
//!
//! The feed keeps the latest sample per replica. Samples older than
//! `max_age` no longer count and are evicted on the next read, so replicas
//! that disappear from the pool stop contributing without explicit cleanup.
//! Samples dated past the local clock (beyond a small skew) are refused on
//! record and dropped on read.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, trace};

use hpa_core::{ReplicaId, ScaleError, ScaleResult, Timestamp, UtilizationSample, epoch_millis};

use crate::source::{MetricSource, SampleFuture, SampleMap};

/// How far past the local clock a sample timestamp may lie.
pub const MAX_CLOCK_SKEW_MS: u64 = 5_000;

/// In-memory telemetry feed keyed by replica id.
///
/// Cheap to clone; clones share the same sample table.
#[derive(Clone)]
pub struct FeedMetricSource {
    latest: Arc<RwLock<HashMap<ReplicaId, UtilizationSample>>>,
    max_age: Duration,
}

impl FeedMetricSource {
    pub fn new(max_age: Duration) -> Self {
        Self {
            latest: Arc::new(RwLock::new(HashMap::new())),
            max_age,
        }
    }

    /// Record a sample, replacing any older one for the same replica.
    ///
    /// Rejects negative or non-finite values and timestamps more than
    /// [`MAX_CLOCK_SKEW_MS`] in the future. Values above 1.0 are valid.
    pub async fn record(&self, sample: UtilizationSample) -> anyhow::Result<()> {
        self.record_at(sample, epoch_millis()).await
    }

    /// [`record`](Self::record) as of `now`.
    pub async fn record_at(&self, sample: UtilizationSample, now: Timestamp) -> anyhow::Result<()> {
        if !sample.is_valid() {
            anyhow::bail!(
                "invalid utilization {} for replica {}",
                sample.value,
                sample.replica_id
            );
        }
        if sample.timestamp > now.saturating_add(MAX_CLOCK_SKEW_MS) {
            anyhow::bail!(
                "timestamp {} for replica {} is in the future",
                sample.timestamp,
                sample.replica_id
            );
        }

        let mut latest = self.latest.write().await;
        match latest.get(&sample.replica_id) {
            Some(existing) if existing.timestamp > sample.timestamp => {
                trace!(replica = %sample.replica_id, "ignoring out-of-order sample");
            }
            _ => {
                latest.insert(sample.replica_id.clone(), sample);
            }
        }
        Ok(())
    }

    /// Drop everything known about a replica.
    pub async fn forget(&self, replica_id: &str) {
        self.latest.write().await.remove(replica_id);
    }

    /// Number of replicas with a retained sample.
    pub async fn len(&self) -> usize {
        self.latest.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.latest.read().await.is_empty()
    }

    /// Sample as of `now`. Used by [`MetricSource::sample`] with the wall clock.
    pub async fn sample_at(&self, replicas: &[ReplicaId], now: Timestamp) -> ScaleResult<SampleMap> {
        let max_age_ms = self.max_age.as_millis() as u64;
        let mut latest = self.latest.write().await;

        let before = latest.len();
        latest.retain(|_, s| {
            s.timestamp <= now.saturating_add(MAX_CLOCK_SKEW_MS)
                && now.saturating_sub(s.timestamp) <= max_age_ms
        });
        if latest.len() < before {
            debug!(evicted = before - latest.len(), "evicted stale samples");
        }

        let wanted: HashSet<&ReplicaId> = replicas.iter().collect();
        let samples: SampleMap = latest
            .iter()
            .filter(|(id, _)| wanted.contains(id))
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect();

        if samples.is_empty() {
            return Err(ScaleError::MetricUnavailable);
        }
        Ok(samples)
    }
}

impl MetricSource for FeedMetricSource {
    fn sample<'a>(&'a self, replicas: &'a [ReplicaId]) -> SampleFuture<'a> {
        Box::pin(self.sample_at(replicas, epoch_millis()))
    }
}
