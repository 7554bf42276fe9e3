//! hpad.toml configuration parser.
//!
//! The file is split into `[autoscaler]`, `[metrics]`, `[pool]` and
//! `[server]` sections, all optional. Durations are written as strings
//! (`"500ms"`, `"15s"`, `"5m"`, `"1h"`, or bare seconds) and resolved into
//! a validated [`AutoscalerConfig`] before the controller sees them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Default scale-down cooldown; longer than scale-up to avoid flapping.
const DEFAULT_SCALE_DOWN_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HpadConfig {
    pub autoscaler: AutoscalerSection,
    pub metrics: MetricsSection,
    pub pool: PoolSection,
    pub server: ServerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerSection {
    #[serde(alias = "minReplicas")]
    pub min_replicas: u32,
    #[serde(alias = "maxReplicas")]
    pub max_replicas: u32,
    #[serde(alias = "targetUtilization")]
    pub target_utilization: f64,
    pub period: String,
    #[serde(alias = "sampleTimeout")]
    pub sample_timeout: String,
    #[serde(alias = "scaleUpCooldown")]
    pub scale_up_cooldown: String,
    /// Defaults to the larger of 5m and `scale_up_cooldown`.
    #[serde(alias = "scaleDownCooldown", skip_serializing_if = "Option::is_none")]
    pub scale_down_cooldown: Option<String>,
    pub tolerance: f64,
    pub aggregation: Aggregation,
    #[serde(alias = "scaleUpLimit", skip_serializing_if = "Option::is_none")]
    pub scale_up_limit: Option<u32>,
    #[serde(alias = "scaleDownLimit", skip_serializing_if = "Option::is_none")]
    pub scale_down_limit: Option<u32>,
    pub event_log_capacity: usize,
}

impl Default for AutoscalerSection {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 10,
            target_utilization: 0.7,
            period: "15s".to_string(),
            sample_timeout: "5s".to_string(),
            scale_up_cooldown: "60s".to_string(),
            scale_down_cooldown: None,
            tolerance: 0.0,
            aggregation: Aggregation::Mean,
            scale_up_limit: None,
            scale_down_limit: None,
            event_log_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Samples older than this are treated as non-reporting.
    pub max_sample_age: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            max_sample_age: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    /// Replicas the in-memory backend starts with. Clamped into bounds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_replicas: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8480".to_string(),
        }
    }
}

/// How per-replica utilization values combine into one signal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Arithmetic mean of reporting replicas.
    #[default]
    Mean,
    /// Hottest reporting replica.
    Max,
}

/// Validated, typed autoscaler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoscalerConfig {
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Target utilization in `(0, 1]`.
    pub target_utilization: f64,
    /// Control-cycle period.
    pub period: Duration,
    /// Upper bound on the sampling phase of one cycle.
    pub sample_timeout: Duration,
    pub scale_up_cooldown: Duration,
    pub scale_down_cooldown: Duration,
    /// Relative deviation from target that is ignored.
    pub tolerance: f64,
    pub aggregation: Aggregation,
    /// Maximum replicas added by one scale-up.
    pub scale_up_limit: Option<u32>,
    /// Maximum replicas removed by one scale-down.
    pub scale_down_limit: Option<u32>,
    pub event_log_capacity: usize,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 10,
            target_utilization: 0.7,
            period: Duration::from_secs(15),
            sample_timeout: Duration::from_secs(5),
            scale_up_cooldown: Duration::from_secs(60),
            scale_down_cooldown: DEFAULT_SCALE_DOWN_COOLDOWN,
            tolerance: 0.0,
            aggregation: Aggregation::Mean,
            scale_up_limit: None,
            scale_down_limit: None,
            event_log_capacity: 256,
        }
    }
}

impl AutoscalerConfig {
    /// Check the invariants the controller relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_replicas < 1 {
            return Err(invalid("min_replicas", "must be at least 1"));
        }
        if self.max_replicas < self.min_replicas {
            return Err(invalid(
                "max_replicas",
                format!(
                    "{} is less than min_replicas {}",
                    self.max_replicas, self.min_replicas
                ),
            ));
        }
        if !(self.target_utilization > 0.0 && self.target_utilization <= 1.0) {
            return Err(invalid(
                "target_utilization",
                format!("{} is not in (0, 1]", self.target_utilization),
            ));
        }
        if self.period.is_zero() {
            return Err(invalid("period", "must be non-zero"));
        }
        if self.sample_timeout.is_zero() {
            return Err(invalid("sample_timeout", "must be non-zero"));
        }
        if !(self.tolerance >= 0.0 && self.tolerance < 1.0) {
            return Err(invalid(
                "tolerance",
                format!("{} is not in [0, 1)", self.tolerance),
            ));
        }
        if self.scale_up_limit == Some(0) {
            return Err(invalid("scale_up_limit", "must be at least 1 when set"));
        }
        if self.scale_down_limit == Some(0) {
            return Err(invalid("scale_down_limit", "must be at least 1 when set"));
        }
        if self.event_log_capacity == 0 {
            return Err(invalid("event_log_capacity", "must be at least 1"));
        }
        if self.scale_down_cooldown < self.scale_up_cooldown {
            warn!(
                scale_up_cooldown_ms = self.scale_up_cooldown.as_millis() as u64,
                scale_down_cooldown_ms = self.scale_down_cooldown.as_millis() as u64,
                "scale_down_cooldown is shorter than scale_up_cooldown; expect flapping"
            );
        }
        Ok(())
    }

    /// Clamp a replica count into `[min_replicas, max_replicas]`.
    pub fn clamp(&self, n: u32) -> u32 {
        n.clamp(self.min_replicas, self.max_replicas)
    }
}

impl HpadConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve the `[autoscaler]` section into a validated config.
    pub fn autoscaler(&self) -> Result<AutoscalerConfig, ConfigError> {
        let s = &self.autoscaler;
        let scale_up_cooldown = duration_field("scale_up_cooldown", &s.scale_up_cooldown)?;
        let scale_down_cooldown = match &s.scale_down_cooldown {
            Some(v) => duration_field("scale_down_cooldown", v)?,
            None => DEFAULT_SCALE_DOWN_COOLDOWN.max(scale_up_cooldown),
        };

        let config = AutoscalerConfig {
            min_replicas: s.min_replicas,
            max_replicas: s.max_replicas,
            target_utilization: s.target_utilization,
            period: duration_field("period", &s.period)?,
            sample_timeout: duration_field("sample_timeout", &s.sample_timeout)?,
            scale_up_cooldown,
            scale_down_cooldown,
            tolerance: s.tolerance,
            aggregation: s.aggregation,
            scale_up_limit: s.scale_up_limit,
            scale_down_limit: s.scale_down_limit,
            event_log_capacity: s.event_log_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Maximum age of a feed sample before it stops counting.
    pub fn max_sample_age(&self) -> Result<Duration, ConfigError> {
        duration_field("max_sample_age", &self.metrics.max_sample_age)
    }
}

/// Parse a duration string like "250ms", "30s", "5m", "1h", or "45".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
