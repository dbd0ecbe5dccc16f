//! HTTP surface of the relay.

mod error;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use chat_relay::{HttpBackends, ReachabilityChecker, Relay};
use config::{BackendConfig, ConfigStore, ServerSettings};
use project_files::RepoCloner;
use reqwest::Client;
use resilience::Backoff;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Uploads arrive base64-encoded inside JSON, so allow well above the 1 MiB
/// per-file cap.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub relay: Relay,
    pub backends: HttpBackends,
    pub checker: ReachabilityChecker,
    pub cloner: RepoCloner,
}

impl AppState {
    pub fn from_settings(settings: &ServerSettings, defaults: BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("lumen/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let backends = HttpBackends::new(client.clone(), settings.connect_timeout);
        let relay = Relay::new(Arc::new(backends.clone()))
            .with_retry(settings.upstream_attempts, Backoff::linear(Duration::from_millis(250)));
        let checker = ReachabilityChecker::new(
            client.clone(),
            settings.backend_api_url.clone(),
            settings.status_timeout,
        );
        let cloner = RepoCloner::new(
            client,
            settings.github_api_url.clone(),
            settings.github_token.clone(),
        );

        Ok(Self {
            config: Arc::new(ConfigStore::new(&settings.config_file, defaults)),
            relay,
            backends,
            checker,
            cloner,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/ollama/chat", post(handlers::chat))
        .route(
            "/api/config",
            get(handlers::get_config).post(handlers::set_config),
        )
        .route("/api/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .route("/api/models", get(handlers::list_models))
        .route("/api/models/select", post(handlers::select_model))
        .route("/api/github/clone", post(handlers::clone_repository))
        .route("/api/files", post(handlers::upload_files))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
