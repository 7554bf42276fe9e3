//! Scaling policy: pure mapping from utilization to a desired size.

use hpa_core::{AutoscalerConfig, ScalingDecision, Timestamp};

/// Absorbs float error in products like `2 * 1.05 / 0.7`, which would
/// otherwise land a hair above an integer and round up one replica too many.
const ROUNDING_GUARD: f64 = 1e-9;

/// Proportional replica count, clamped to `[min_replicas, max_replicas]`.
///
/// `desired = ceil(current * average_utilization / target_utilization)`.
/// Ties round up in favour of availability.
pub fn decide(
    current_replicas: u32,
    average_utilization: f64,
    min_replicas: u32,
    max_replicas: u32,
    target_utilization: f64,
) -> u32 {
    proportional(current_replicas, average_utilization, target_utilization)
        .clamp(min_replicas, max_replicas)
}

fn proportional(current: u32, average: f64, target: f64) -> u32 {
    let raw = current as f64 * average / target;
    if raw.is_nan() {
        return current;
    }
    // `as` saturates, so +inf lands on u32::MAX and gets clamped.
    (raw - ROUNDING_GUARD).ceil().max(0.0) as u32
}

/// [`decide`] bound to a configuration, with tolerance and step limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingPolicy {
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_utilization: f64,
    /// Relative deviation from target that does not trigger a change.
    pub tolerance: f64,
    /// Most replicas one scale-up may add.
    pub scale_up_limit: Option<u32>,
    /// Most replicas one scale-down may remove.
    pub scale_down_limit: Option<u32>,
}

impl ScalingPolicy {
    pub fn from_config(config: &AutoscalerConfig) -> Self {
        Self {
            min_replicas: config.min_replicas,
            max_replicas: config.max_replicas,
            target_utilization: config.target_utilization,
            tolerance: config.tolerance,
            scale_up_limit: config.scale_up_limit,
            scale_down_limit: config.scale_down_limit,
        }
    }

    /// Desired size for `current` replicas at `average` utilization.
    ///
    /// Always within `[min_replicas, max_replicas]`, even when `current`
    /// is not (e.g. after an external resize).
    pub fn desired_replicas(&self, current: u32, average: f64) -> u32 {
        self.evaluate(current, average).0
    }

    /// Produce an immutable decision with a human-readable reason.
    pub fn decide(&self, current: u32, average: f64, now: Timestamp) -> ScalingDecision {
        let (desired_replicas, reason) = self.evaluate(current, average);
        ScalingDecision {
            desired_replicas,
            reason,
            timestamp: now,
        }
    }

    fn evaluate(&self, current: u32, average: f64) -> (u32, String) {
        let ratio = average / self.target_utilization;

        if (ratio - 1.0).abs() <= self.tolerance {
            let desired = self.clamp(current);
            let reason = if desired == current {
                format!(
                    "utilization {average:.3} within tolerance {:.3} of target {:.3}",
                    self.tolerance, self.target_utilization
                )
            } else {
                format!("size {current} outside bounds, clamped to {desired}")
            };
            return (desired, reason);
        }

        let raw = proportional(current, average, self.target_utilization);
        let mut desired = raw;
        let mut limited = false;

        if desired > current
            && let Some(limit) = self.scale_up_limit
            && desired - current > limit
        {
            desired = current.saturating_add(limit);
            limited = true;
        }
        if desired < current
            && let Some(limit) = self.scale_down_limit
            && current - desired > limit
        {
            desired = current - limit;
            limited = true;
        }

        let clamped = self.clamp(desired);
        let direction = if average > self.target_utilization {
            "above"
        } else {
            "below"
        };
        let mut reason = format!(
            "utilization {average:.3} {direction} target {:.3}: {current} -> {raw}",
            self.target_utilization
        );
        if limited {
            reason.push_str(&format!(", step-limited to {desired}"));
        }
        if clamped != desired {
            reason.push_str(&format!(
                ", clamped to [{}, {}] = {clamped}",
                self.min_replicas, self.max_replicas
            ));
        }

        (clamped, reason)
    }

    fn clamp(&self, n: u32) -> u32 {
        n.clamp(self.min_replicas, self.max_replicas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(min: u32, max: u32, target: f64) -> ScalingPolicy {
        ScalingPolicy {
            min_replicas: min,
            max_replicas: max,
            target_utilization: target,
            tolerance: 0.0,
            scale_up_limit: None,
            scale_down_limit: None,
        }
    }

    #[test]
    fn scale_up_proportionally() {
        // ceil(2 * 1.05 / 0.7) = 3
        assert_eq!(decide(2, 1.05, 2, 5, 0.7), 3);
    }

    #[test]
    fn scale_down_clamped_to_min() {
        // ceil(4 * 0.2 / 0.7) = ceil(1.14) = 2
        assert_eq!(decide(4, 0.2, 2, 5, 0.7), 2);
        assert_eq!(decide(4, 0.05, 2, 5, 0.7), 2);
    }

    #[test]
    fn scale_up_clamped_to_max() {
        assert_eq!(decide(4, 3.0, 2, 5, 0.7), 5);
    }

    #[test]
    fn at_target_holds() {
        assert_eq!(decide(3, 0.7, 1, 10, 0.7), 3);
    }

    #[test]
    fn fractional_result_rounds_up() {
        // 3 * 0.8 / 0.7 = 3.43 → 4
        assert_eq!(decide(3, 0.8, 1, 10, 0.7), 4);
        // 2 * 0.36 / 0.7 = 1.03 → 2
        assert_eq!(decide(2, 0.36, 1, 10, 0.7), 2);
    }

    #[test]
    fn zero_utilization_goes_to_min() {
        assert_eq!(decide(6, 0.0, 2, 10, 0.5), 2);
    }

    #[test]
    fn empty_pool_is_brought_to_min() {
        assert_eq!(decide(0, 0.9, 2, 5, 0.7), 2);
    }

    #[test]
    fn infinite_utilization_saturates_at_max() {
        assert_eq!(decide(2, f64::INFINITY, 1, 8, 0.7), 8);
    }

    #[test]
    fn result_always_within_bounds() {
        let utilizations = [0.0, 0.01, 0.2, 0.5, 0.69, 0.7, 0.71, 1.0, 1.05, 2.0, 10.0, 1e6];
        let targets = [0.1, 0.5, 0.7, 1.0];
        for min in 1..=4 {
            for max in min..=12 {
                for current in 0..=15 {
                    for &avg in &utilizations {
                        for &target in &targets {
                            let d = decide(current, avg, min, max, target);
                            assert!(
                                (min..=max).contains(&d),
                                "decide({current}, {avg}, {min}, {max}, {target}) = {d}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn tolerance_suppresses_small_deviation() {
        let mut p = policy(1, 10, 0.5);
        p.tolerance = 0.1;
        // ratio 1.08, within 10%.
        assert_eq!(p.desired_replicas(4, 0.54), 4);
        // ratio 1.2, outside.
        assert_eq!(p.desired_replicas(4, 0.6), 5);
    }

    #[test]
    fn tolerance_still_enforces_bounds() {
        let mut p = policy(3, 5, 0.5);
        p.tolerance = 0.2;
        assert_eq!(p.desired_replicas(1, 0.5), 3);
        let decision = p.decide(1, 0.5, 42);
        assert!(decision.reason.contains("clamped"));
    }

    #[test]
    fn scale_up_limit_caps_step() {
        let mut p = policy(1, 20, 0.5);
        p.scale_up_limit = Some(2);
        // Unlimited would be ceil(2 * 2.0 / 0.5) = 8.
        assert_eq!(p.desired_replicas(2, 2.0), 4);
    }

    #[test]
    fn scale_down_limit_caps_step() {
        let mut p = policy(1, 20, 0.5);
        p.scale_down_limit = Some(1);
        assert_eq!(p.desired_replicas(10, 0.05), 9);
    }

    #[test]
    fn bounds_win_over_step_limit() {
        let mut p = policy(4, 10, 0.5);
        p.scale_up_limit = Some(1);
        // Pool shrank externally to 1; the minimum is restored in one step.
        assert_eq!(p.desired_replicas(1, 1.0), 4);
    }

    #[test]
    fn decision_carries_reason_and_timestamp() {
        let p = policy(2, 5, 0.7);
        let decision = p.decide(2, 1.05, 1_000);
        assert_eq!(decision.desired_replicas, 3);
        assert_eq!(decision.timestamp, 1_000);
        assert!(decision.reason.contains("above target"));
        assert!(decision.reason.contains("2 -> 3"));

        let decision = p.decide(4, 0.2, 2_000);
        assert_eq!(decision.desired_replicas, 2);
        assert!(decision.reason.contains("below target"));
    }

    #[test]
    fn from_config_copies_fields() {
        let config = AutoscalerConfig {
            min_replicas: 2,
            max_replicas: 7,
            target_utilization: 0.6,
            tolerance: 0.05,
            scale_up_limit: Some(3),
            ..AutoscalerConfig::default()
        };
        let p = ScalingPolicy::from_config(&config);
        assert_eq!(p.min_replicas, 2);
        assert_eq!(p.max_replicas, 7);
        assert_eq!(p.target_utilization, 0.6);
        assert_eq!(p.tolerance, 0.05);
        assert_eq!(p.scale_up_limit, Some(3));
        assert_eq!(p.scale_down_limit, None);
    }
}
