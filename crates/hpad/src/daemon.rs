//! Wiring of the pool, metric feed, controller and API server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tracing::{error, info};

use hpa_api::{ApiState, build_router};
use hpa_autoscale::Controller;
use hpa_core::HpadConfig;
use hpa_metrics::FeedMetricSource;
use hpa_pool::{InMemoryBackend, ManagedPool, ResourcePool};

/// Everything a running daemon needs, before anything is started.
pub struct Daemon {
    pub controller: Arc<Controller>,
    pub router: Router,
    pub backend: InMemoryBackend,
}

/// Build the subsystems from a config and take the first pool reading.
pub async fn assemble(config: &HpadConfig) -> anyhow::Result<Daemon> {
    let autoscaler = config.autoscaler()?;
    let max_sample_age = config.max_sample_age()?;

    // Workload backend, seeded inside the configured bounds.
    let initial = autoscaler.clamp(
        config
            .pool
            .initial_replicas
            .unwrap_or(autoscaler.min_replicas),
    );
    let backend = InMemoryBackend::with_replicas(initial);
    info!(replicas = initial, "in-memory backend seeded");

    // Resource pool.
    let pool = Arc::new(ManagedPool::new(
        backend.clone(),
        autoscaler.min_replicas,
        autoscaler.max_replicas,
    ));
    pool.refresh().await?;
    info!(
        min = autoscaler.min_replicas,
        max = autoscaler.max_replicas,
        "resource pool initialized"
    );

    // Metric feed.
    let feed = FeedMetricSource::new(max_sample_age);
    info!(
        max_sample_age_ms = max_sample_age.as_millis() as u64,
        "metric feed initialized"
    );

    // Controller.
    let controller = Arc::new(Controller::new(
        autoscaler,
        Arc::new(feed.clone()),
        pool.clone(),
    ));

    let router = build_router(ApiState {
        controller: controller.handle(),
        pool,
        feed,
    });

    Ok(Daemon {
        controller,
        router,
        backend,
    })
}

/// Run until Ctrl-C: control loop in the background, API in the foreground.
pub async fn run(config: &HpadConfig, listen: SocketAddr) -> anyhow::Result<()> {
    info!("hpad starting");
    let daemon = assemble(config).await?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Control loop ───────────────────────────────────────────

    let controller = daemon.controller.clone();
    let control_handle = tokio::spawn(async move {
        controller.run(shutdown_rx).await;
    });

    // ── API server ─────────────────────────────────────────────

    info!(%listen, replicas = daemon.backend.len().await, "API server starting");
    let listener = tokio::net::TcpListener::bind(listen).await?;

    let server = axum::serve(listener, daemon.router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C, shutting down");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    if let Err(e) = control_handle.await {
        error!(error = %e, "control loop task failed");
    }

    info!("hpad stopped");
    Ok(())
}
