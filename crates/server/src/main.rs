use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carbone_core::{load_config, validate_config, MetricsRecorder, ResolutionEngine};
use carbone_server::api::create_router;
use carbone_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("CARBONE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!(version = VERSION, "Configuration loaded successfully");
    info!("Data directory: {:?}", config.cache.data_dir);
    info!(
        guessit = config.guessit.enabled && !config.guessit.api_key.is_empty(),
        precache = config.precache.enabled,
        "Feature flags"
    );

    // Build the resolution engine
    let metrics = Arc::new(MetricsRecorder::new());
    let engine = ResolutionEngine::from_config(&config, Arc::clone(&metrics))
        .context("Failed to build resolution engine")?;

    // Restore caches from the previous run
    let loaded = engine.load_persisted().await;
    info!(
        identities = loaded.identities,
        streams = loaded.streams,
        "Caches restored"
    );

    // Background loops
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let summary_handle = Arc::clone(&metrics).spawn_summary_loop(
        std::time::Duration::from_secs(config.metrics.summary_interval_secs),
        shutdown_tx.subscribe(),
    );
    let flush_handle = Arc::clone(&engine).spawn_identity_flush_loop(
        config.cache.identity_flush_interval(),
        shutdown_tx.subscribe(),
    );

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&engine)));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop background loops
    info!("Server shutting down...");
    let _ = shutdown_tx.send(());
    let _ = summary_handle.await;
    let _ = flush_handle.await;

    // Final snapshot of both caches
    engine.flush_all().await;
    metrics.log_summary();
    info!("Caches flushed");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
