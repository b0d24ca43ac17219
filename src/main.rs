//! Coord Core demo server
//!
//! Wires the Redis store, the `pdf_queue` demo queue, the cron scheduler and
//! the HTTP surface together.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coord_core::api::{create_router, demo, AppState};
use coord_core::{Config, QueueOptions, QueueRegistry, RedisStore, Scheduler, SharedStore};

/// Startup: tracing, config, store, queues, scheduler, HTTP server. The
/// scheduler and then the queue workers are stopped after the server has
/// drained.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coord_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Coord Core demo server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: app={}, redis={}, port={}, max_concurrent={}",
        config.app_name, config.redis_url, config.server_port, config.queue_max_concurrent
    );

    let store: Arc<dyn SharedStore> = Arc::new(RedisStore::connect(&config.redis_url).await?);

    let registry = QueueRegistry::new();
    let queue = registry.create_queue(
        Arc::clone(&store),
        &config.app_name,
        "pdf_queue",
        demo::pdf_handler(config.simulated_work()),
        QueueOptions {
            max_concurrent: config.queue_max_concurrent,
            result_ttl: config.result_ttl(),
            ..QueueOptions::default()
        },
    )?;
    registry.init();

    let scheduler = Scheduler::new();
    let stats_queue = Arc::clone(&queue);
    scheduler.scheduled_task("pdf_queue_stats", &config.stats_cron, move || {
        let queue = Arc::clone(&stats_queue);
        async move {
            match queue.get_stats().await {
                Ok(stats) => info!(
                    queue = %stats.queue_name,
                    queued = stats.queue_size,
                    processing = stats.processing_count,
                    available = stats.available_slots,
                    "Queue stats"
                ),
                Err(e) => warn!(error = %e, "Queue stats unavailable"),
            }
            Ok(())
        }
    })?;
    scheduler.init();

    let port = config.server_port;
    let app = create_router(AppState::new(store, queue, config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.close().await;
    registry.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
