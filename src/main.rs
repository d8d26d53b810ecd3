//! hostwatch server
//!
//! Run with: cargo run
//!
//! Configuration is read from `HOSTWATCH_*` and `SMTP_*` environment
//! variables, see [`hostwatch::config`]. Log filtering uses `RUST_LOG`
//! (default: `hostwatch=info,tower_http=info`).

use hostwatch::api::run_server;
use hostwatch::config::MonitorConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hostwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env()?;

    tracing::info!("hostwatch configuration:");
    tracing::info!("  Listen: {}:{}", config.host, config.port);
    tracing::info!(
        "  Workers: {} (queue {})",
        config.pool.workers,
        config.pool.queue_capacity
    );
    for metric in hostwatch::data::MetricType::ALL {
        let t = config.thresholds.for_metric(metric);
        tracing::info!(
            "  {} thresholds: {} / {} / {}",
            metric,
            t.warning,
            t.critical,
            t.emergency
        );
    }
    tracing::info!(
        "  Alert window: {:?}, min samples {}, ratio {}",
        config.alert.window,
        config.alert.min_samples,
        config.alert.sustain_ratio
    );
    tracing::info!(
        "  Retention: {} days, checked every {:?}",
        config.retention.horizon.num_days(),
        config.retention.check_interval
    );
    match &config.smtp {
        Some(smtp) => tracing::info!("  SMTP: {}:{} ({:?})", smtp.host, smtp.port, smtp.tls),
        None => tracing::info!("  SMTP: disabled, alerts are logged only"),
    }

    run_server(config).await
}
