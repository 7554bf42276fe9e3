//! hpa-api — REST API for the autoscaler.
//!
//! Read-only views of the controller, a push endpoint for utilization
//! telemetry, and manual resizes that go through the same pool as the
//! control loop.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness |
//! | GET | `/api/v1/status` | Controller status |
//! | GET | `/api/v1/events?limit=N` | Recent cycle events, oldest first |
//! | GET | `/api/v1/replicas` | Committed replica list |
//! | POST | `/api/v1/samples` | Push utilization samples |
//! | POST | `/api/v1/scale` | Manual resize |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use hpa_autoscale::ControllerHandle;
use hpa_metrics::FeedMetricSource;
use hpa_pool::ResourcePool;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub controller: ControllerHandle,
    pub pool: Arc<dyn ResourcePool>,
    pub feed: FeedMetricSource,
}

/// Build the complete router (REST + health + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(handlers::get_status))
        .route("/events", get(handlers::list_events))
        .route("/replicas", get(handlers::list_replicas))
        .route("/samples", post(handlers::push_samples))
        .route("/scale", post(handlers::scale_pool))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
