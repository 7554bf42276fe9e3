//! Controller: drives the sample → decide → apply cycle.
//!
//! The controller is the only writer of [`ControllerState`] and the only
//! automatic caller of [`ResourcePool::scale_to`]. State is passed into
//! every cycle explicitly, so a cycle can be driven in isolation with a
//! chosen `now`. The periodic [`Controller::run`] loop owns the state for
//! the lifetime of the process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use hpa_core::{
    ActionCounts, AutoscalerConfig, ControllerPhase, ControllerState, ControllerStatus,
    CycleEvent, ReplicaId, ScaleAction, ScaleError, Timestamp, epoch_millis,
};
use hpa_metrics::{MetricSource, SampleMap, aggregate};
use hpa_pool::ResourcePool;

use crate::events::EventLog;
use crate::policy::ScalingPolicy;

/// Read-only view of a running controller, shared with the API.
#[derive(Clone)]
pub struct ControllerHandle {
    status: Arc<RwLock<ControllerStatus>>,
    events: EventLog,
}

impl ControllerHandle {
    fn new(config: &AutoscalerConfig) -> Self {
        Self {
            status: Arc::new(RwLock::new(ControllerStatus {
                phase: ControllerPhase::Idle,
                state: ControllerState::default(),
                min_replicas: config.min_replicas,
                max_replicas: config.max_replicas,
                target_utilization: config.target_utilization,
                last_event: None,
                counts: ActionCounts::default(),
            })),
            events: EventLog::new(config.event_log_capacity),
        }
    }

    /// Current status snapshot.
    pub async fn status(&self) -> ControllerStatus {
        self.status.read().await.clone()
    }

    /// The last `limit` cycle events, oldest first.
    pub async fn events(&self, limit: usize) -> Vec<CycleEvent> {
        self.events.recent(limit).await
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    async fn set_phase(&self, phase: ControllerPhase) {
        self.status.write().await.phase = phase;
    }

    async fn finish(&self, state: &ControllerState, event: CycleEvent) {
        {
            let mut status = self.status.write().await;
            status.phase = ControllerPhase::Idle;
            status.state = state.clone();
            status.counts.record(&event);
            status.last_event = Some(event.clone());
        }
        self.events.push(event).await;
    }
}

/// The autoscaling controller for one resource pool.
pub struct Controller {
    config: AutoscalerConfig,
    policy: ScalingPolicy,
    source: Arc<dyn MetricSource>,
    pool: Arc<dyn ResourcePool>,
    handle: ControllerHandle,
}

impl Controller {
    pub fn new(
        config: AutoscalerConfig,
        source: Arc<dyn MetricSource>,
        pool: Arc<dyn ResourcePool>,
    ) -> Self {
        let policy = ScalingPolicy::from_config(&config);
        let handle = ControllerHandle::new(&config);
        Self {
            config,
            policy,
            source,
            pool,
            handle,
        }
    }

    pub fn config(&self) -> &AutoscalerConfig {
        &self.config
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// A handle for observing this controller from other tasks.
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Run one control cycle at time `now`.
    ///
    /// Never fails: every error degrades to holding the current size and
    /// is reported on the returned event.
    pub async fn run_cycle(&self, state: &mut ControllerState, now: Timestamp) -> CycleEvent {
        self.handle.set_phase(ControllerPhase::Sampling).await;
        let event = self.cycle(state, now).await;
        log_event(&event);
        self.handle.finish(state, event.clone()).await;
        event
    }

    async fn cycle(&self, state: &mut ControllerState, now: Timestamp) -> CycleEvent {
        // ── Sampling ───────────────────────────────────────────────
        let replicas = match self.pool.refresh().await {
            Ok(replicas) => replicas,
            Err(e) => {
                warn!(error = %e, "failed to read pool, holding");
                let mut event = hold(now, state.current_replicas, None, ScaleAction::Hold);
                event.error = Some(e.to_string());
                return event;
            }
        };
        let current = replicas.len() as u32;
        state.current_replicas = current;

        let ids: Vec<ReplicaId> = replicas.into_iter().map(|r| r.id).collect();
        let Some(samples) = self.sample(&ids).await else {
            return hold(now, current, None, ScaleAction::MetricUnavailable);
        };

        let utilization: HashMap<ReplicaId, f64> = samples
            .iter()
            .map(|(id, s)| (id.clone(), s.value))
            .collect();
        if let Err(e) = self.pool.observe(utilization).await {
            debug!(error = %e, "failed to record utilization on pool");
        }

        // ── Deciding ───────────────────────────────────────────────
        self.handle.set_phase(ControllerPhase::Deciding).await;
        let Some(average) = aggregate(&samples, self.config.aggregation) else {
            return hold(now, current, None, ScaleAction::MetricUnavailable);
        };

        let decision = self.policy.decide(current, average, now);
        let desired = decision.desired_replicas;
        let mut event = hold(now, current, Some(average), ScaleAction::Hold);
        event.desired_replicas = desired;

        if desired == current {
            debug!(reason = %decision.reason, "no change needed");
            return event;
        }

        let scaling_up = desired > current;
        let (last, cooldown) = if scaling_up {
            (state.last_scale_up, self.config.scale_up_cooldown)
        } else {
            (state.last_scale_down, self.config.scale_down_cooldown)
        };
        if let Some(remaining_ms) = cooldown_remaining(last, cooldown, now) {
            debug!(
                from = current,
                to = desired,
                remaining_ms,
                reason = %decision.reason,
                "cooldown active, skipping"
            );
            event.action = ScaleAction::SkipCooldown;
            return event;
        }

        // ── Applying ───────────────────────────────────────────────
        self.handle.set_phase(ControllerPhase::Applying).await;
        event.action = if scaling_up {
            ScaleAction::ScaleUp
        } else {
            ScaleAction::ScaleDown
        };

        match self.apply(current, desired).await {
            Ok(applied) => {
                event.desired_replicas = applied;
                state.current_replicas = applied;
                if scaling_up {
                    state.last_scale_up = Some(now);
                } else {
                    state.last_scale_down = Some(now);
                }
                info!(
                    from = current,
                    to = applied,
                    reason = %decision.reason,
                    "scaled pool"
                );
            }
            Err(e) => {
                warn!(
                    from = current,
                    to = desired,
                    error = %e,
                    "scaling action failed, retrying next cycle"
                );
                event.error = Some(e.to_string());
            }
        }

        event
    }

    /// Sample the pool's replicas, bounded by the per-cycle timeout.
    ///
    /// Returns `None` when nothing usable came back.
    async fn sample(&self, ids: &[ReplicaId]) -> Option<SampleMap> {
        let sampled = tokio::time::timeout(self.config.sample_timeout, self.source.sample(ids)).await;

        let samples = match sampled {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                debug!(error = %e, replicas = ids.len(), "no metrics this cycle");
                return None;
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.sample_timeout.as_millis() as u64,
                    "metric sampling timed out"
                );
                return None;
            }
        };

        // Only replicas in the pool right now count, and only usable values.
        let wanted: HashSet<&ReplicaId> = ids.iter().collect();
        let samples: SampleMap = samples
            .into_iter()
            .filter(|(id, s)| wanted.contains(id) && s.is_valid())
            .collect();

        debug!(
            reporting = samples.len(),
            replicas = ids.len(),
            "metrics sampled"
        );
        (!samples.is_empty()).then_some(samples)
    }

    /// Scale the pool, clamping once into the pool's own bounds if it
    /// rejects the request as out of bounds. Returns the size applied.
    async fn apply(&self, current: u32, desired: u32) -> Result<u32, ScaleError> {
        match self.pool.scale_to(desired).await {
            Ok(()) => Ok(desired),
            Err(ScaleError::ScaleOutOfBounds { requested, min, max }) => {
                let clamped = requested.clamp(min, max);
                let same_direction = (clamped > current) == (desired > current);
                if clamped == current || !same_direction {
                    return Err(ScaleError::ScaleOutOfBounds { requested, min, max });
                }
                warn!(
                    requested,
                    min,
                    max,
                    clamped,
                    "pool bounds narrower than policy bounds, clamping"
                );
                self.pool.scale_to(clamped).await?;
                Ok(clamped)
            }
            Err(e) => Err(e),
        }
    }

    /// Run the control loop until `shutdown` flips.
    ///
    /// The first cycle runs immediately; later ones every `period`. A slow
    /// cycle delays the next tick rather than bunching cycles up.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            period_ms = self.config.period.as_millis() as u64,
            min_replicas = self.config.min_replicas,
            max_replicas = self.config.max_replicas,
            target_utilization = self.config.target_utilization,
            "autoscaler started"
        );

        let mut state = ControllerState::default();
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(&mut state, epoch_millis()).await;
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}

fn hold(
    now: Timestamp,
    current: u32,
    average_utilization: Option<f64>,
    action: ScaleAction,
) -> CycleEvent {
    CycleEvent {
        timestamp: now,
        current_replicas: current,
        average_utilization,
        desired_replicas: current,
        action,
        error: None,
    }
}

/// Milliseconds left before the cooldown elapses, or `None` if it has.
fn cooldown_remaining(last: Option<Timestamp>, cooldown: Duration, now: Timestamp) -> Option<u64> {
    let last = last?;
    let cooldown_ms = cooldown.as_millis() as u64;
    let elapsed = now.saturating_sub(last);
    (elapsed < cooldown_ms).then(|| cooldown_ms - elapsed)
}

fn log_event(event: &CycleEvent) {
    match (&event.error, event.action) {
        (Some(error), _) => warn!(
            timestamp = event.timestamp,
            current = event.current_replicas,
            average = ?event.average_utilization,
            desired = event.desired_replicas,
            action = %event.action,
            %error,
            "control cycle"
        ),
        (None, ScaleAction::Hold) => debug!(
            timestamp = event.timestamp,
            current = event.current_replicas,
            average = ?event.average_utilization,
            desired = event.desired_replicas,
            action = %event.action,
            "control cycle"
        ),
        (None, _) => info!(
            timestamp = event.timestamp,
            current = event.current_replicas,
            average = ?event.average_utilization,
            desired = event.desired_replicas,
            action = %event.action,
            "control cycle"
        ),
    }
}
