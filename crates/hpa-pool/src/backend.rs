//! Workload backends, whatever actually runs the replicas.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use hpa_core::{Replica, epoch_millis};

/// Boxed future alias for backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// The external workload manager that creates and destroys replicas.
///
/// Networking, storage and identity of the replicas are entirely the
/// backend's business; the pool only counts and names them.
pub trait WorkloadBackend: Send + Sync {
    /// The replicas that actually exist right now.
    fn list_replicas(&self) -> BackendFuture<'_, Vec<Replica>>;

    /// Start one new replica.
    fn create_replica(&self) -> BackendFuture<'_, Replica>;

    /// Stop the given replica.
    fn destroy_replica<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()>;
}

struct InMemoryInner {
    replicas: Vec<Replica>,
    next_id: u64,
    /// Queued outcomes for upcoming create calls; `false` fails the call.
    create_script: VecDeque<bool>,
    destroy_script: VecDeque<bool>,
    created_total: u64,
    destroyed_total: u64,
}

/// Backend that keeps replicas in memory.
///
/// Used by `hpad` in standalone mode and by tests. Supports an artificial
/// per-operation latency and scripted failures. Cheap to clone; clones
/// share state, which lets tests mutate the "actual" replica set behind
/// the pool's back.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<InMemoryInner>>,
    latency: Duration,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_replicas(0)
    }

    /// Start with `n` replicas already running.
    pub fn with_replicas(n: u32) -> Self {
        let mut inner = InMemoryInner {
            replicas: Vec::new(),
            next_id: 0,
            create_script: VecDeque::new(),
            destroy_script: VecDeque::new(),
            created_total: 0,
            destroyed_total: 0,
        };
        for _ in 0..n {
            let replica = spawn(&mut inner);
            inner.replicas.push(replica);
        }
        Self {
            inner: Arc::new(Mutex::new(inner)),
            latency: Duration::ZERO,
        }
    }

    /// Sleep this long inside every create/destroy call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue outcomes for the next create calls (`false` = fail).
    pub async fn script_creates(&self, outcomes: &[bool]) {
        self.inner.lock().await.create_script.extend(outcomes);
    }

    /// Queue outcomes for the next destroy calls (`false` = fail).
    pub async fn script_destroys(&self, outcomes: &[bool]) {
        self.inner.lock().await.destroy_script.extend(outcomes);
    }

    /// Number of replicas currently running.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.replicas.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.replicas.is_empty()
    }

    /// Successful create calls so far.
    pub async fn created_total(&self) -> u64 {
        self.inner.lock().await.created_total
    }

    /// Successful destroy calls so far.
    pub async fn destroyed_total(&self) -> u64 {
        self.inner.lock().await.destroyed_total
    }

    /// Remove a replica without going through the pool (e.g. a crash).
    pub async fn kill(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.replicas.len();
        inner.replicas.retain(|r| r.id != id);
        inner.replicas.len() < before
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn(inner: &mut InMemoryInner) -> Replica {
    inner.next_id += 1;
    Replica::new(format!("replica-{}", inner.next_id), epoch_millis())
}

impl WorkloadBackend for InMemoryBackend {
    fn list_replicas(&self) -> BackendFuture<'_, Vec<Replica>> {
        Box::pin(async move { Ok(self.inner.lock().await.replicas.clone()) })
    }

    fn create_replica(&self) -> BackendFuture<'_, Replica> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let mut inner = self.inner.lock().await;
            if inner.create_script.pop_front() == Some(false) {
                anyhow::bail!("create rejected by backend");
            }
            let replica = spawn(&mut inner);
            inner.replicas.push(replica.clone());
            inner.created_total += 1;
            debug!(replica = %replica.id, "replica created");
            Ok(replica)
        })
    }

    fn destroy_replica<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let mut inner = self.inner.lock().await;
            if inner.destroy_script.pop_front() == Some(false) {
                anyhow::bail!("destroy of {id} rejected by backend");
            }
            let before = inner.replicas.len();
            inner.replicas.retain(|r| r.id != id);
            if inner.replicas.len() == before {
                anyhow::bail!("replica {id} not found");
            }
            inner.destroyed_total += 1;
            debug!(replica = %id, "replica destroyed");
            Ok(())
        })
    }
}
