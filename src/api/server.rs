use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, purge, query, stats, submit, AppState};
use crate::config::MonitorConfig;
use crate::retention::RetentionWorker;
use crate::service::MonitorService;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Metrics
        .route("/api/monitor/data", post(submit).get(query))
        .route("/api/monitor/stats", get(stats))
        // Retention
        .route("/api/monitor/purge", post(purge))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server until ctrl-c, then drain background work
pub async fn run_server(config: MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let service = Arc::new(MonitorService::from_config(config)?);

    // Start background workers
    let retention = Arc::new(service.retention_worker());
    let retention_handle = Arc::clone(&retention).start();

    let state = Arc::new(AppState {
        service: Arc::clone(&service),
    });
    let app = build_router(state);

    tracing::info!("Starting hostwatch server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&retention)))
        .await?;

    if let Err(e) = retention_handle.await {
        tracing::warn!(error = %e, "Retention worker ended abnormally");
    }

    let report = service.shutdown().await;
    tracing::info!(
        drained = report.drained,
        abandoned_workers = report.abandoned_workers,
        "hostwatch server stopped"
    );
    Ok(())
}

async fn shutdown_signal(retention: Arc<RetentionWorker>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");

    tracing::info!("Shutdown signal received, stopping workers...");
    retention.stop();
}
