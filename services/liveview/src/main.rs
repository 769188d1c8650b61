use anyhow::{Context, Result};
use liveview::config::{Config, ServiceConfig};
use liveview::{
    start_api_server, AppState, BlobStore, FrameIngestor, FrameNamer, FsBlobStore,
    LatestFrameRegistry, SystemClock,
};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting LiveView frame service"
    );

    // Initialize metrics
    if config.service.metrics_enabled {
        init_metrics(config.service.metrics_port)?;
    }

    // Initialize components
    let fs_store = FsBlobStore::new(&config.storage.root_dir)
        .await
        .context("Failed to initialize blob store")?;
    info!(root = %fs_store.root().display(), "Serving frames from local storage");
    let blob_store: Arc<dyn BlobStore> = Arc::new(fs_store);

    let ingestor = Arc::new(FrameIngestor::new(
        blob_store.clone(),
        Arc::new(LatestFrameRegistry::new()),
        FrameNamer::new(Box::new(SystemClock), config.ingest.extension.clone()),
        config.ingest.require_jpeg_signature,
    ));

    if config.storage.restore_latest {
        ingestor
            .restore_latest()
            .await
            .context("Failed to restore latest frame")?;
    }

    let api_state = AppState {
        registry: ingestor.registry().clone(),
        ingestor,
        blob_store,
        image_cache_max_age: config.image_cache_max_age(),
        service_name: config.service.name.clone(),
    };

    start_api_server(api_state, &config.api, shutdown_signal()).await?;

    info!("LiveView frame service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(config: &ServiceConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.log_format == "pretty" {
        subscriber.with(fmt::layer().pretty()).init();
    } else {
        subscriber.with(fmt::layer().json()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
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
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Shutting down LiveView frame service");
}
