//! Prometheus text exposition format.
//!
//! Renders the controller status into the Prometheus text exposition
//! format for scraping by a Prometheus server or compatible agent.

use hpa_core::{ControllerStatus, ScaleAction};

/// Render a controller status snapshot into Prometheus text format.
///
/// Gauges describe the pool and the latest cycle; counters track cycle
/// outcomes by `action` label.
pub fn render_prometheus(status: &ControllerStatus) -> String {
    let mut out = String::new();

    gauge(
        &mut out,
        "hpa_current_replicas",
        "Replicas in the pool at the last cycle.",
        status.state.current_replicas as f64,
    );

    let desired = status
        .last_event
        .as_ref()
        .map(|e| e.desired_replicas)
        .unwrap_or(status.state.current_replicas);
    gauge(
        &mut out,
        "hpa_desired_replicas",
        "Replicas recommended by the scaling policy at the last cycle.",
        desired as f64,
    );

    gauge(
        &mut out,
        "hpa_min_replicas",
        "Configured lower replica bound.",
        status.min_replicas as f64,
    );
    gauge(
        &mut out,
        "hpa_max_replicas",
        "Configured upper replica bound.",
        status.max_replicas as f64,
    );
    gauge(
        &mut out,
        "hpa_target_utilization",
        "Configured target utilization (0.0-1.0).",
        status.target_utilization,
    );

    // Only exported when the last cycle had samples.
    if let Some(avg) = status.last_event.as_ref().and_then(|e| e.average_utilization) {
        gauge(
            &mut out,
            "hpa_average_utilization",
            "Aggregated utilization observed at the last cycle.",
            avg,
        );
    }

    out.push_str("# HELP hpa_cycles_total Control cycles by outcome.\n");
    out.push_str("# TYPE hpa_cycles_total counter\n");
    for action in ScaleAction::ALL {
        out.push_str(&format!(
            "hpa_cycles_total{{action=\"{}\"}} {}\n",
            action,
            status.counts.get(action)
        ));
    }

    out.push_str("# HELP hpa_failed_scales_total Scale attempts that returned an error.\n");
    out.push_str("# TYPE hpa_failed_scales_total counter\n");
    out.push_str(&format!(
        "hpa_failed_scales_total {}\n",
        status.counts.failed_scales
    ));

    out
}

fn gauge(out: &mut String, name: &str, help: &str, value: f64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    out.push_str(&format!("{name} {value}\n"));
}
