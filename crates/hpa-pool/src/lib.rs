//! hpa-pool — the set of running replicas of one workload.
//!
//! The pool is the only thing the controller scales. It delegates the
//! actual creation and destruction of replicas to a [`WorkloadBackend`]
//! (the external workload manager) and guarantees that callers only ever
//! observe whole transitions.
//!
//! # Architecture
//!
//! ```text
//! ResourcePool (trait)
//!   └── ManagedPool<B>
//!       ├── scale lock      (one scale_to at a time; others get ScaleInProgress)
//!       ├── committed list  (what readers see; swapped after a full transition)
//!       └── WorkloadBackend (list / create / destroy)
//!           └── InMemoryBackend (standalone mode and tests)
//! ```

pub mod backend;
pub mod pool;

pub use backend::{BackendFuture, InMemoryBackend, WorkloadBackend};
pub use pool::{ManagedPool, PoolFuture, ResourcePool};
