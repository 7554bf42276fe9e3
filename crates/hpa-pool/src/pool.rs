//! Resource pool: all-or-nothing scaling over a workload backend.
//!
//! The pool keeps a committed replica list that readers see. `scale_to`
//! works against the backend under a scale lock and only swaps the
//! committed list once the whole transition has succeeded, so nobody can
//! observe a half-scaled pool. A second `scale_to` arriving while one is in
//! flight is rejected with `ScaleInProgress` instead of being queued.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use hpa_core::{Replica, ReplicaId, ScaleError, ScaleResult};

use crate::backend::WorkloadBackend;

/// Boxed future alias for pool operations.
pub type PoolFuture<'a, T> = Pin<Box<dyn Future<Output = ScaleResult<T>> + Send + 'a>>;

/// The set of running replicas the controller scales.
pub trait ResourcePool: Send + Sync {
    /// Re-read the actual replica set from the backend and return it.
    ///
    /// The cached list is advisory only; this is the authoritative read
    /// the controller performs at the start of every cycle. While a scale
    /// is in flight the last committed list is returned instead.
    fn refresh(&self) -> PoolFuture<'_, Vec<Replica>>;

    /// Actual size, re-read from the backend.
    fn current_size(&self) -> PoolFuture<'_, u32> {
        Box::pin(async move { Ok(self.refresh().await?.len() as u32) })
    }

    /// The last committed replica list, without touching the backend.
    fn snapshot(&self) -> PoolFuture<'_, Vec<Replica>>;

    /// Move the pool to exactly `n` replicas.
    ///
    /// Idempotent: succeeds without side effects when already at `n`.
    fn scale_to(&self, n: u32) -> PoolFuture<'_, ()>;

    /// Attach this cycle's utilization to the committed replicas.
    /// Replicas absent from `utilization` are marked non-reporting.
    fn observe(&self, utilization: HashMap<ReplicaId, f64>) -> PoolFuture<'_, ()>;

    /// Inclusive `(min, max)` size bounds.
    fn bounds(&self) -> (u32, u32);
}

/// Pool backed by a [`WorkloadBackend`].
pub struct ManagedPool<B> {
    backend: B,
    min_replicas: u32,
    max_replicas: u32,
    /// Held for the whole duration of a `scale_to` or a refresh.
    scale_lock: Mutex<()>,
    /// What readers see.
    committed: RwLock<Vec<Replica>>,
}

impl<B: WorkloadBackend> ManagedPool<B> {
    /// Create a pool; the committed list is empty until the first refresh.
    pub fn new(backend: B, min_replicas: u32, max_replicas: u32) -> Self {
        Self {
            backend,
            min_replicas,
            max_replicas,
            scale_lock: Mutex::new(()),
            committed: RwLock::new(Vec::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn read_backend(&self) -> ScaleResult<Vec<Replica>> {
        self.backend
            .list_replicas()
            .await
            .map_err(|e| ScaleError::PoolBackendError(e.to_string()))
    }

    /// Replace the committed list, keeping known utilization readings.
    async fn commit(&self, mut replicas: Vec<Replica>) {
        let mut committed = self.committed.write().await;
        let known: HashMap<&str, Option<f64>> = committed
            .iter()
            .map(|r| (r.id.as_str(), r.utilization))
            .collect();
        for replica in &mut replicas {
            if replica.utilization.is_none() {
                replica.utilization = known.get(replica.id.as_str()).copied().flatten();
            }
        }
        *committed = replicas;
    }

    async fn do_refresh(&self) -> ScaleResult<Vec<Replica>> {
        let Ok(_guard) = self.scale_lock.try_lock() else {
            debug!("scale in flight, serving committed replica list");
            return Ok(self.committed.read().await.clone());
        };

        let actual = self.read_backend().await?;
        let cached = self.committed.read().await.len();
        if cached != actual.len() {
            debug!(
                cached,
                actual = actual.len(),
                "pool size changed outside the controller"
            );
        }
        self.commit(actual).await;
        Ok(self.committed.read().await.clone())
    }

    async fn do_scale_to(&self, n: u32) -> ScaleResult<()> {
        if n < self.min_replicas || n > self.max_replicas {
            return Err(ScaleError::ScaleOutOfBounds {
                requested: n,
                min: self.min_replicas,
                max: self.max_replicas,
            });
        }

        let Ok(_guard) = self.scale_lock.try_lock() else {
            return Err(ScaleError::ScaleInProgress);
        };

        let current = self.read_backend().await?;
        let from = current.len() as u32;

        if from == n {
            debug!(target = n, "already at target, no scaling needed");
            self.commit(current).await;
            return Ok(());
        }

        let result = if n > from {
            self.grow(current, n - from).await
        } else {
            self.shrink(current, from - n).await
        };

        match result {
            Ok(replicas) => {
                self.commit(replicas).await;
                info!(from, to = n, "pool scaled");
                Ok(())
            }
            Err(e) => {
                // Commit only if the rollback restored the starting size;
                // otherwise keep the old list until the next refresh.
                match self.read_backend().await {
                    Ok(actual) if actual.len() as u32 == from => self.commit(actual).await,
                    Ok(actual) => warn!(
                        from,
                        actual = actual.len(),
                        "rollback incomplete, keeping committed replica list"
                    ),
                    Err(resync) => warn!(error = %resync, "failed to resync pool after scale error"),
                }
                Err(e)
            }
        }
    }

    /// Create `count` replicas; on failure destroy the ones created so far.
    async fn grow(&self, mut replicas: Vec<Replica>, count: u32) -> ScaleResult<Vec<Replica>> {
        let mut created: Vec<ReplicaId> = Vec::with_capacity(count as usize);

        for _ in 0..count {
            match self.backend.create_replica().await {
                Ok(replica) => {
                    created.push(replica.id.clone());
                    replicas.push(replica);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        created = created.len(),
                        "scale-up failed, rolling back"
                    );
                    for id in created.iter().rev() {
                        if let Err(rollback) = self.backend.destroy_replica(id).await {
                            warn!(replica = %id, error = %rollback, "rollback destroy failed");
                        }
                    }
                    return Err(ScaleError::PoolBackendError(e.to_string()));
                }
            }
        }

        Ok(replicas)
    }

    /// Destroy the `count` most recently created replicas; on failure
    /// start replacements for the ones destroyed so far.
    async fn shrink(&self, replicas: Vec<Replica>, count: u32) -> ScaleResult<Vec<Replica>> {
        let mut newest_first: Vec<Replica> = replicas.into_iter().rev().collect();
        newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let keep = newest_first.split_off(count as usize);
        for (destroyed, victim) in newest_first.iter().enumerate() {
            if let Err(e) = self.backend.destroy_replica(&victim.id).await {
                warn!(
                    replica = %victim.id,
                    error = %e,
                    destroyed,
                    "scale-down failed, rolling back"
                );
                for _ in 0..destroyed {
                    if let Err(rollback) = self.backend.create_replica().await {
                        warn!(error = %rollback, "rollback create failed");
                        break;
                    }
                }
                return Err(ScaleError::PoolBackendError(e.to_string()));
            }
        }

        let mut remaining = keep;
        remaining.reverse();
        Ok(remaining)
    }

    async fn do_observe(&self, utilization: HashMap<ReplicaId, f64>) -> ScaleResult<()> {
        let mut committed = self.committed.write().await;
        for replica in committed.iter_mut() {
            replica.utilization = utilization.get(&replica.id).copied();
        }
        Ok(())
    }
}

impl<B: WorkloadBackend> ResourcePool for ManagedPool<B> {
    fn refresh(&self) -> PoolFuture<'_, Vec<Replica>> {
        Box::pin(self.do_refresh())
    }

    fn snapshot(&self) -> PoolFuture<'_, Vec<Replica>> {
        Box::pin(async move { Ok(self.committed.read().await.clone()) })
    }

    fn scale_to(&self, n: u32) -> PoolFuture<'_, ()> {
        Box::pin(self.do_scale_to(n))
    }

    fn observe(&self, utilization: HashMap<ReplicaId, f64>) -> PoolFuture<'_, ()> {
        Box::pin(self.do_observe(utilization))
    }

    fn bounds(&self) -> (u32, u32) {
        (self.min_replicas, self.max_replicas)
    }
}
