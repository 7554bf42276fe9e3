//! REST API handlers.
//!
//! Every JSON response uses the `{success, data, error}` envelope.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hpa_core::{ReplicaId, ScaleError, Timestamp, UtilizationSample, epoch_millis};

use crate::ApiState;

/// Events returned when the caller gives no `limit`.
const DEFAULT_EVENT_LIMIT: usize = 50;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// HTTP status for a failed pool operation.
fn scale_error_status(err: &ScaleError) -> StatusCode {
    match err {
        ScaleError::ScaleInProgress => StatusCode::CONFLICT,
        ScaleError::ScaleOutOfBounds { .. } => StatusCode::BAD_REQUEST,
        ScaleError::PoolBackendError(_) => StatusCode::BAD_GATEWAY,
        ScaleError::MetricUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Controller ─────────────────────────────────────────────────

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.status().await)
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/events
pub async fn list_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    ApiResponse::ok(state.controller.events(limit).await)
}

// ── Pool ───────────────────────────────────────────────────────

/// GET /api/v1/replicas
pub async fn list_replicas(State(state): State<ApiState>) -> impl IntoResponse {
    match state.pool.snapshot().await {
        Ok(replicas) => ApiResponse::ok(replicas).into_response(),
        Err(e) => error_response(&e.to_string(), scale_error_status(&e)).into_response(),
    }
}

/// Manual resize request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub replicas: u32,
}

/// POST /api/v1/scale
///
/// Goes through the same pool as the controller, so it is rejected with
/// 409 while a controller-initiated scale is in flight (and vice versa).
pub async fn scale_pool(
    State(state): State<ApiState>,
    Json(req): Json<ScaleRequest>,
) -> impl IntoResponse {
    info!(replicas = req.replicas, "manual scale requested");
    match state.pool.scale_to(req.replicas).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({ "replicas": req.replicas })).into_response(),
        Err(e) => {
            warn!(replicas = req.replicas, error = %e, "manual scale failed");
            error_response(&e.to_string(), scale_error_status(&e)).into_response()
        }
    }
}

// ── Telemetry ──────────────────────────────────────────────────

/// One pushed reading. `timestamp` defaults to the time of receipt.
#[derive(Debug, Serialize, Deserialize)]
pub struct SampleInput {
    pub replica_id: ReplicaId,
    pub value: f64,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SampleBatch {
    pub samples: Vec<SampleInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SampleReceipt {
    pub accepted: usize,
    pub rejected: Vec<String>,
}

/// POST /api/v1/samples
///
/// Invalid readings are reported back individually; the rest of the batch
/// is still recorded.
pub async fn push_samples(
    State(state): State<ApiState>,
    Json(batch): Json<SampleBatch>,
) -> impl IntoResponse {
    if batch.samples.is_empty() {
        return error_response("no samples in request", StatusCode::BAD_REQUEST).into_response();
    }

    let now = epoch_millis();
    let mut receipt = SampleReceipt {
        accepted: 0,
        rejected: Vec::new(),
    };
    for input in batch.samples {
        let sample = UtilizationSample::new(
            input.replica_id,
            input.value,
            input.timestamp.unwrap_or(now),
        );
        match state.feed.record(sample).await {
            Ok(()) => receipt.accepted += 1,
            Err(e) => receipt.rejected.push(e.to_string()),
        }
    }
    debug!(
        accepted = receipt.accepted,
        rejected = receipt.rejected.len(),
        "samples received"
    );

    if receipt.accepted == 0 {
        return error_response(&receipt.rejected.join("; "), StatusCode::BAD_REQUEST)
            .into_response();
    }
    ApiResponse::ok(receipt).into_response()
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let status = state.controller.status().await;
    let body = hpa_metrics::render_prometheus(&status);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
