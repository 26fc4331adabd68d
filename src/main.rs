//! Cache Sched server binary
//!
//! Serves the eviction cache over HTTP while the serial scheduler keeps it
//! maintained in the background.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_sched::api::{create_router, AppState};
use cache_sched::{register_maintenance_task, Config};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create cache and scheduler with configured parameters
/// 4. Register and start the cache maintenance task
/// 5. Start HTTP server on configured port
/// 6. On SIGINT/SIGTERM stop serving, then shut the scheduler down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_sched=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: min_entries={}, max_entries={}, usage_expiration={}s, port={}, maintenance_interval={}s",
        config.min_entries,
        config.max_entries,
        config.usage_expiration_secs,
        config.server_port,
        config.maintenance_interval_secs
    );

    let state = AppState::from_config(&config).context("invalid configuration")?;
    register_maintenance_task(
        &state.scheduler,
        state.cache.clone(),
        config.maintenance_interval(),
    )?;
    state.scheduler.start()?;
    info!("Background scheduler started");

    let scheduler = state.scheduler.clone();
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let timeout = config.shutdown_timeout();
    let clean = tokio::task::spawn_blocking(move || scheduler.shutdown_and_wait(timeout))
        .await
        .context("scheduler shutdown panicked")?;
    if !clean {
        warn!("Scheduler did not stop within {:?}", timeout);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
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
