use anyhow::{Context, Result};
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod metrics;
mod middleware;
mod models;
mod routes;
mod services;

use config::AppConfig;
use services::{
    AppState,
    blob_store::ObjectStoreBlobs,
    metadata_store::{self, SqliteMetadataStore},
};

const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    let _log_guard = init_logging(&cfg)?;

    tracing::info!("Starting file-service with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let in_memory = cfg.is_in_memory_database();
    if !in_memory {
        ensure_database_dir(&cfg.database_url)?;
    }
    let db = Arc::new(
        metadata_store::connect(&cfg.database_url, in_memory)
            .await
            .with_context(|| format!("connecting to {}", cfg.database_url))?,
    );
    let metadata = SqliteMetadataStore::new(db.clone());

    // --- Schema bootstrap ---
    let applied = metadata.bootstrap().await.context("bootstrapping schema")?;
    tracing::info!("Applied {} schema statements", applied);
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Blob store + metrics ---
    let blobs = ObjectStoreBlobs::from_config(&cfg).context("configuring blob store")?;
    let meter_provider =
        metrics::init_provider(cfg.metrics_endpoint.as_deref(), METRICS_EXPORT_INTERVAL)?;

    let state = AppState {
        metadata: Arc::new(metadata),
        blobs: Arc::new(blobs),
        bucket_name: cfg.bucket_name.clone(),
        metrics: Arc::new(metrics::ApiMetrics::new()),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(provider) = meter_provider {
        if let Err(err) = provider.shutdown() {
            tracing::warn!("Failed to flush metrics on shutdown: {}", err);
        }
    }
    db.close().await;
    tracing::info!("Server stopped");

    Ok(())
}

/// Install the tracing subscriber.
///
/// With `log_file` set, JSON lines go to that file through a non-blocking
/// writer; the returned guard must live until exit so buffered lines flush.
fn init_logging(cfg: &AppConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_file) = &cfg.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let name = log_file
        .file_name()
        .with_context(|| format!("log file {} has no file name", log_file.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}

/// Create the parent directory of a file-backed SQLite URL.
fn ensure_database_dir(database_url: &str) -> Result<()> {
    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {}", err);
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
    tracing::info!("Shutdown signal received");
}
