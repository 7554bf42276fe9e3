//! Bounded log of recent cycle events.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::RwLock;

use hpa_core::CycleEvent;

/// Ring buffer of the most recent [`CycleEvent`]s, oldest first.
///
/// Cheap to clone; clones share the same buffer.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<VecDeque<CycleEvent>>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append an event, evicting the oldest one when full.
    pub async fn push(&self, event: CycleEvent) {
        let mut events = self.events.write().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// The last `limit` events, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<CycleEvent> {
        let events = self.events.read().await;
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
