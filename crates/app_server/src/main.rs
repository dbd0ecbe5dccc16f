use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use app_server::{AppState, router};
use config::{BackendConfig, ServerSettings};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let settings = ServerSettings::from_env().context("invalid environment")?;
    let _log_guard = init_local_logger(&settings.data_dir.join("logs"));
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let defaults = BackendConfig::from_env();
    let state = AppState::from_settings(&settings, defaults)?;
    info!(
        config = %state.config.path().display(),
        backend = state.config.snapshot().preferred_backend.as_str(),
        ollama = %state.config.snapshot().ollama.api_host,
        "configuration loaded"
    );

    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    info!(addr = %settings.bind, "relay listening");

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}

fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "lumen.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,app_server=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_writer(writer))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    guard
}
