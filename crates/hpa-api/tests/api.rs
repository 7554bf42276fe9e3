//! HTTP surface tests.
//!
//! Drives the full router with `oneshot` against an in-memory pool and
//! the push-based metric feed, running controller cycles by hand.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use hpa_api::{ApiState, build_router};
use hpa_autoscale::Controller;
use hpa_core::{AutoscalerConfig, ControllerState, ScaleAction, epoch_millis};
use hpa_metrics::FeedMetricSource;
use hpa_pool::{InMemoryBackend, ManagedPool, ResourcePool};

struct Harness {
    router: Router,
    controller: Controller,
    backend: InMemoryBackend,
}

async fn harness(initial: u32) -> Harness {
    let config = AutoscalerConfig {
        min_replicas: 2,
        max_replicas: 5,
        target_utilization: 0.7,
        ..AutoscalerConfig::default()
    };
    let backend = InMemoryBackend::with_replicas(initial);
    let pool = Arc::new(ManagedPool::new(
        backend.clone(),
        config.min_replicas,
        config.max_replicas,
    ));
    pool.refresh().await.unwrap();
    let feed = FeedMetricSource::new(Duration::from_secs(30));
    let controller = Controller::new(config, Arc::new(feed.clone()), pool.clone());
    let router = build_router(ApiState {
        controller: controller.handle(),
        pool,
        feed,
    });
    Harness {
        router,
        controller,
        backend,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    read(resp).await
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    read(resp).await
}

async fn read(resp: axum::response::Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let h = harness(2).await;
    let (status, body) = get(&h.router, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn status_before_first_cycle_is_idle() {
    let h = harness(2).await;
    let (status, body) = get(&h.router, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "idle");
    assert_eq!(body["data"]["min_replicas"], 2);
    assert_eq!(body["data"]["max_replicas"], 5);
    assert!(body["data"]["last_event"].is_null());
}

#[tokio::test]
async fn pushed_samples_drive_a_scale_up() {
    let h = harness(2).await;
    let (_, body) = get(&h.router, "/api/v1/replicas").await;
    let ids: Vec<String> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 2);

    let samples: Vec<Value> = ids
        .iter()
        .map(|id| serde_json::json!({ "replica_id": id, "value": 1.05 }))
        .collect();
    let (status, body) = post(
        &h.router,
        "/api/v1/samples",
        serde_json::json!({ "samples": samples }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["accepted"], 2);

    let mut state = ControllerState::default();
    let event = h.controller.run_cycle(&mut state, epoch_millis()).await;
    assert_eq!(event.action, ScaleAction::ScaleUp);
    assert_eq!(h.backend.len().await, 3);

    let (_, body) = get(&h.router, "/api/v1/status").await;
    assert_eq!(body["data"]["state"]["current_replicas"], 3);
    assert_eq!(body["data"]["last_event"]["action"], "scale-up");
    assert_eq!(body["data"]["counts"]["scale_up"], 1);

    let (_, body) = get(&h.router, "/api/v1/events?limit=10").await;
    let events = body["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["desired_replicas"], 3);
}

#[tokio::test]
async fn events_limit_returns_newest() {
    let h = harness(2).await;
    let mut state = ControllerState::default();
    // No samples pushed: every cycle is metric-unavailable.
    for t in 1..=4 {
        h.controller.run_cycle(&mut state, t).await;
    }
    let (status, body) = get(&h.router, "/api/v1/events?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let events = body["data"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["timestamp"], 3);
    assert_eq!(events[1]["timestamp"], 4);
    assert_eq!(events[1]["action"], "metric-unavailable");
}

#[tokio::test]
async fn invalid_samples_are_rejected() {
    let h = harness(2).await;
    let (status, body) = post(
        &h.router,
        "/api/v1/samples",
        serde_json::json!({ "samples": [{ "replica_id": "replica-0", "value": -0.5 }] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("invalid utilization"));
}

#[tokio::test]
async fn future_dated_samples_are_rejected() {
    let h = harness(2).await;
    let far_future = epoch_millis() + 10 * 365 * 24 * 3_600_000;
    let (status, body) = post(
        &h.router,
        "/api/v1/samples",
        serde_json::json!({
            "samples": [{ "replica_id": "replica-1", "value": 5.0, "timestamp": far_future }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("in the future"));

    // A later, honest sample for the same replica still gets through.
    let (status, body) = post(
        &h.router,
        "/api/v1/samples",
        serde_json::json!({ "samples": [{ "replica_id": "replica-1", "value": 0.1 }] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["accepted"], 1);
}

#[tokio::test]
async fn manual_scale_resizes_pool() {
    let h = harness(2).await;
    let (status, body) = post(
        &h.router,
        "/api/v1/scale",
        serde_json::json!({ "replicas": 4 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["replicas"], 4);
    assert_eq!(h.backend.len().await, 4);

    let (_, body) = get(&h.router, "/api/v1/replicas").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn manual_scale_out_of_bounds_is_rejected() {
    let h = harness(2).await;
    let (status, body) = post(
        &h.router,
        "/api/v1/scale",
        serde_json::json!({ "replicas": 9 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("outside [2, 5]"));
    assert_eq!(h.backend.len().await, 2);
}

#[tokio::test]
async fn manual_scale_backend_failure_is_bad_gateway() {
    let h = harness(2).await;
    h.backend.script_creates(&[false]).await;
    let (status, body) = post(
        &h.router,
        "/api/v1/scale",
        serde_json::json!({ "replicas": 3 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("pool backend error"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_manual_scale_conflicts() {
    let config = AutoscalerConfig {
        min_replicas: 1,
        max_replicas: 5,
        ..AutoscalerConfig::default()
    };
    let backend = InMemoryBackend::with_replicas(1).with_latency(Duration::from_millis(100));
    let pool = Arc::new(ManagedPool::new(backend.clone(), 1, 5));
    pool.refresh().await.unwrap();
    let feed = FeedMetricSource::new(Duration::from_secs(30));
    let controller = Controller::new(config, Arc::new(feed.clone()), pool.clone());
    let router = build_router(ApiState {
        controller: controller.handle(),
        pool,
        feed,
    });

    let first = {
        let router = router.clone();
        tokio::spawn(async move { post(&router, "/api/v1/scale", serde_json::json!({ "replicas": 4 })).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let (status, _) = post(&router, "/api/v1/scale", serde_json::json!({ "replicas": 2 })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(backend.len().await, 4);
}

#[tokio::test]
async fn metrics_exposition_reflects_cycles() {
    let h = harness(2).await;
    let mut state = ControllerState::default();
    h.controller.run_cycle(&mut state, 1).await;

    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("hpa_current_replicas 2"));
    assert!(text.contains("hpa_cycles_total{action=\"metric-unavailable\"} 1"));
}
