//! Domain types shared across the control loop.
//!
//! All timestamps are milliseconds since the Unix epoch. Types that cross
//! the HTTP surface are serializable to/from JSON.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Opaque identifier of one running replica.
pub type ReplicaId = String;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

// ── Replicas and samples ───────────────────────────────────────────

/// One running instance of the scaled workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Replica {
    pub id: ReplicaId,
    /// When the backend reported this replica as created.
    pub created_at: Timestamp,
    /// Latest utilization observed for this replica, if any.
    pub utilization: Option<f64>,
}

impl Replica {
    pub fn new(id: impl Into<ReplicaId>, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            created_at,
            utilization: None,
        }
    }
}

/// A single utilization reading for a replica.
///
/// Values are in `[0, +inf)`; anything above 1.0 means the replica is
/// saturated past its target, which is a valid reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UtilizationSample {
    pub replica_id: ReplicaId,
    pub value: f64,
    pub timestamp: Timestamp,
}

impl UtilizationSample {
    pub fn new(replica_id: impl Into<ReplicaId>, value: f64, timestamp: Timestamp) -> Self {
        Self {
            replica_id: replica_id.into(),
            value,
            timestamp,
        }
    }

    /// Whether the value is a usable utilization reading.
    pub fn is_valid(&self) -> bool {
        self.value.is_finite() && self.value >= 0.0
    }
}

// ── Decisions ──────────────────────────────────────────────────────

/// Output of the scaling policy for one cycle. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingDecision {
    pub desired_replicas: u32,
    pub reason: String,
    pub timestamp: Timestamp,
}

/// What a control cycle ended up doing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleAction {
    Hold,
    ScaleUp,
    ScaleDown,
    SkipCooldown,
    MetricUnavailable,
}

impl ScaleAction {
    pub const ALL: [ScaleAction; 5] = [
        ScaleAction::Hold,
        ScaleAction::ScaleUp,
        ScaleAction::ScaleDown,
        ScaleAction::SkipCooldown,
        ScaleAction::MetricUnavailable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleAction::Hold => "hold",
            ScaleAction::ScaleUp => "scale-up",
            ScaleAction::ScaleDown => "scale-down",
            ScaleAction::SkipCooldown => "skip-cooldown",
            ScaleAction::MetricUnavailable => "metric-unavailable",
        }
    }
}

impl fmt::Display for ScaleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record emitted once per control cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleEvent {
    pub timestamp: Timestamp,
    pub current_replicas: u32,
    /// `None` when no replica reported this cycle.
    pub average_utilization: Option<f64>,
    pub desired_replicas: u32,
    pub action: ScaleAction,
    /// Set when the cycle hit an error (failed scale, unreadable pool).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Controller state ───────────────────────────────────────────────

/// Phase of the control-cycle state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControllerPhase {
    #[default]
    Idle,
    Sampling,
    Deciding,
    Applying,
}

/// Mutable state of the controller, threaded through every cycle.
///
/// `None` timestamps mean "never scaled in that direction", which always
/// satisfies the cooldown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ControllerState {
    pub last_scale_up: Option<Timestamp>,
    pub last_scale_down: Option<Timestamp>,
    pub current_replicas: u32,
}

/// Running totals of cycle outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionCounts {
    pub hold: u64,
    pub scale_up: u64,
    pub scale_down: u64,
    pub skip_cooldown: u64,
    pub metric_unavailable: u64,
    /// Scale attempts that returned an error.
    pub failed_scales: u64,
}

impl ActionCounts {
    /// Account for one finished cycle.
    pub fn record(&mut self, event: &CycleEvent) {
        match event.action {
            ScaleAction::Hold => self.hold += 1,
            ScaleAction::ScaleUp => self.scale_up += 1,
            ScaleAction::ScaleDown => self.scale_down += 1,
            ScaleAction::SkipCooldown => self.skip_cooldown += 1,
            ScaleAction::MetricUnavailable => self.metric_unavailable += 1,
        }
        let attempted = matches!(event.action, ScaleAction::ScaleUp | ScaleAction::ScaleDown);
        if attempted && event.error.is_some() {
            self.failed_scales += 1;
        }
    }

    pub fn get(&self, action: ScaleAction) -> u64 {
        match action {
            ScaleAction::Hold => self.hold,
            ScaleAction::ScaleUp => self.scale_up,
            ScaleAction::ScaleDown => self.scale_down,
            ScaleAction::SkipCooldown => self.skip_cooldown,
            ScaleAction::MetricUnavailable => self.metric_unavailable,
        }
    }
}

/// Point-in-time view of the controller, served by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerStatus {
    pub phase: ControllerPhase,
    pub state: ControllerState,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_utilization: f64,
    pub last_event: Option<CycleEvent>,
    pub counts: ActionCounts,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn epoch_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_kebab_case() {
        let json = serde_json::to_string(&ScaleAction::SkipCooldown).unwrap();
        assert_eq!(json, "\"skip-cooldown\"");
        let back: ScaleAction = serde_json::from_str("\"metric-unavailable\"").unwrap();
        assert_eq!(back, ScaleAction::MetricUnavailable);
    }

    #[test]
    fn action_display_matches_serde_name() {
        for action in ScaleAction::ALL {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json.trim_matches('"'), action.to_string());
        }
    }

    #[test]
    fn sample_validity() {
        assert!(UtilizationSample::new("r-1", 0.0, 0).is_valid());
        assert!(UtilizationSample::new("r-1", 2.5, 0).is_valid());
        assert!(!UtilizationSample::new("r-1", -0.1, 0).is_valid());
        assert!(!UtilizationSample::new("r-1", f64::NAN, 0).is_valid());
        assert!(!UtilizationSample::new("r-1", f64::INFINITY, 0).is_valid());
    }

    #[test]
    fn counts_track_failures_separately() {
        let mut counts = ActionCounts::default();
        let mut event = CycleEvent {
            timestamp: 0,
            current_replicas: 2,
            average_utilization: Some(1.0),
            desired_replicas: 3,
            action: ScaleAction::ScaleUp,
            error: None,
        };
        counts.record(&event);
        event.error = Some("pool backend error: boom".to_string());
        counts.record(&event);

        assert_eq!(counts.get(ScaleAction::ScaleUp), 2);
        assert_eq!(counts.failed_scales, 1);
        assert_eq!(counts.get(ScaleAction::Hold), 0);

        // Errors on cycles that never attempted a scale are not scale failures.
        event.action = ScaleAction::Hold;
        counts.record(&event);
        assert_eq!(counts.failed_scales, 1);
        assert_eq!(counts.get(ScaleAction::Hold), 1);
    }

    #[test]
    fn event_omits_empty_error() {
        let event = CycleEvent {
            timestamp: 1,
            current_replicas: 2,
            average_utilization: None,
            desired_replicas: 2,
            action: ScaleAction::MetricUnavailable,
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["action"], "metric-unavailable");
    }
}
