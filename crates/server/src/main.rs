use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convertifile_core::{
    load_config, validate_config, ConverterSet, Dispatcher, FsResultStore, JobQueue, JobStore,
    MemoryQueue, ResultStore, RetentionSweeper, SqliteJobStore, WorkerPool,
};

use convertifile_server::{create_router, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
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
    let config_path = std::env::var("CONVERTIFILE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Working directories must exist before anything writes to them
    std::fs::create_dir_all(&config.storage.intake_dir)
        .with_context(|| format!("Failed to create {:?}", config.storage.intake_dir))?;
    std::fs::create_dir_all(&config.storage.result_dir)
        .with_context(|| format!("Failed to create {:?}", config.storage.result_dir))?;

    // Job store
    let job_store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to open job database")?,
    );
    info!("Job store initialized");

    // Result artifact store
    let result_store: Arc<dyn ResultStore> = Arc::new(
        FsResultStore::new(&config.storage.result_dir)
            .context("Failed to initialize result store")?,
    );

    // Work queue and dispatcher
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&job_store),
        Arc::clone(&queue),
    ));
    dispatcher
        .ensure_ready()
        .await
        .context("Work queue is not ready")?;

    // External converters; refusing to start beats failing every job
    let converters = Arc::new(ConverterSet::standard(config.converter.clone()));
    converters
        .validate_all()
        .await
        .context("Converter tool validation failed")?;
    info!("Converter tools validated");

    // Worker pool
    let pool = WorkerPool::new(
        config.workers.count,
        Arc::clone(&job_store),
        Arc::clone(&queue),
        Arc::clone(&result_store),
        Arc::clone(&converters),
    );
    pool.start();
    info!("Worker pool started with {} workers", config.workers.count);

    // Retention sweeper
    let sweeper = Arc::new(RetentionSweeper::new(
        config.retention.clone(),
        Arc::clone(&job_store),
        Arc::clone(&result_store),
        Arc::clone(&dispatcher),
    ));
    sweeper.start();
    info!(
        "Retention sweeper started (retention: {}h, interval: {}s)",
        config.retention.retention_hours, config.retention.sweep_interval_secs
    );

    // Create app state and router
    let state = Arc::new(AppState::new(
        config.clone(),
        job_store,
        result_store,
        dispatcher,
    ));
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

    info!("Server shutting down...");
    sweeper.stop();
    pool.stop();
    info!("Workers stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
