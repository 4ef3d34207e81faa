use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use lcaudit::config::{AuditConfig, CliArgs};
use lcaudit::detached::DetachedTasks;
use lcaudit::log_capture::{LogLevel, LogSource, LogState};
use lcaudit::pipeline::AuditPipeline;
use lcaudit::server;
use lcaudit::state::{AppState, AuditTracker, SharedState};
use lcaudit::storage::{LocalStore, ReportStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = AuditConfig::from_args(args);

    // Console always; a daily-rolling file too when --log-dir is given.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lcaudit=info,tower_http=info".into());
    let (file_layer, _file_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lcaudit.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    info!("Starting lcaudit v{}", env!("CARGO_PKG_VERSION"));
    info!("Data dir: {:?}", config.data_dir);
    info!("Public URL: {}", config.public_base_url);
    let missing = config.missing_keys();
    if !missing.is_empty() {
        warn!(
            "Missing credentials, affected collectors and providers will be skipped: {}",
            missing.join(", ")
        );
    }

    let store: Arc<dyn ReportStore> = Arc::new(LocalStore::open(
        &config.data_dir,
        &config.history_db_path(),
        config.public_base_url.clone(),
    )?);

    let logs = Arc::new(LogState::new());
    let detached = DetachedTasks::new(logs.clone());
    let tracker = Arc::new(AuditTracker::new());
    let pipeline = Arc::new(AuditPipeline::from_config(
        &config,
        store.clone(),
        tracker.clone(),
        logs.clone(),
        detached.clone(),
    ));

    let port = config.port;
    let state: SharedState = Arc::new(AppState::new(
        config, logs, tracker, store, pipeline, detached,
    ));

    state
        .logs
        .emit(
            LogSource::Pipeline,
            LogLevel::Info,
            format!("lcaudit starting on port {}", port),
        )
        .await;

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("lcaudit listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    info!("lcaudit shutting down");
    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Received shutdown signal");
    state
        .logs
        .emit(LogSource::Pipeline, LogLevel::Info, "Shutdown signal received")
        .await;
    let _ = state.shutdown_tx.send(());
}
