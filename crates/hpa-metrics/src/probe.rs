//! Probe metric source: concurrent fan-out over replicas.
//!
//! Every replica is probed in its own task. The whole fan-out shares one
//! deadline; probes that error or have not answered by then are treated as
//! non-reporting for the cycle and their tasks are aborted.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use hpa_core::{ReplicaId, ScaleError, UtilizationSample, epoch_millis};

use crate::source::{MetricSource, SampleFuture, SampleMap};

/// Boxed future returned by [`ReplicaProbe::probe`].
pub type ProbeFuture = Pin<Box<dyn Future<Output = anyhow::Result<f64>> + Send>>;

/// Reads the current utilization of one replica.
pub trait ReplicaProbe: Send + Sync + 'static {
    fn probe(&self, replica: ReplicaId) -> ProbeFuture;
}

/// Fan-out source bounded by a per-cycle deadline.
pub struct ProbeMetricSource {
    probe: Arc<dyn ReplicaProbe>,
    timeout: Duration,
}

impl ProbeMetricSource {
    pub fn new(probe: Arc<dyn ReplicaProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    async fn fan_out(&self, replicas: &[ReplicaId]) -> Result<SampleMap, ScaleError> {
        let mut tasks = JoinSet::new();
        for id in replicas {
            let probe = Arc::clone(&self.probe);
            let id = id.clone();
            tasks.spawn(async move {
                let result = probe.probe(id.clone()).await;
                (id, result)
            });
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut samples = SampleMap::new();

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((id, Ok(value))))) => {
                    let sample = UtilizationSample::new(id.clone(), value, epoch_millis());
                    if sample.is_valid() {
                        samples.insert(id, sample);
                    } else {
                        warn!(replica = %id, value, "probe returned invalid utilization");
                    }
                }
                Ok(Some(Ok((id, Err(e))))) => {
                    debug!(replica = %id, error = %e, "probe failed");
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "probe task panicked");
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(
                        pending = tasks.len(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "sampling deadline reached"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        if samples.is_empty() {
            return Err(ScaleError::MetricUnavailable);
        }
        Ok(samples)
    }
}

impl MetricSource for ProbeMetricSource {
    fn sample<'a>(&'a self, replicas: &'a [ReplicaId]) -> SampleFuture<'a> {
        Box::pin(self.fan_out(replicas))
    }
}
