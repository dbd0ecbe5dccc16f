use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, KeepAlive, Sse};
use chat_relay::{RelayRequest, StatusReport};
use chrono::Utc;
use config::{BackendConfig, BackendConfigPatch, OllamaPatch};
use futures::{Stream, StreamExt};
use project_files::{NormalizedUpload, UploadedFile, normalize_uploads, parse_repo_url};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{ApiError, AppState};

type Payload<T> = Result<Json<T>, JsonRejection>;

pub(crate) async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Payload<RelayRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload?;
    let config = state.config.snapshot();
    let events = state.relay.open(&config, request).await?;
    let frames = events.map(|event| Ok::<_, Infallible>(Event::default().data(event.to_data())));
    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

pub(crate) async fn get_config(State(state): State<Arc<AppState>>) -> Json<BackendConfig> {
    let store = state.config.clone();
    let config = tokio::task::spawn_blocking(move || store.get())
        .await
        .unwrap_or_else(|err| {
            warn!("config read task failed, serving defaults: {err}");
            state.config.defaults().masked()
        });
    Json(config)
}

pub(crate) async fn set_config(
    State(state): State<Arc<AppState>>,
    payload: Payload<BackendConfigPatch>,
) -> Result<Json<Value>, ApiError> {
    let Json(patch) = payload?;
    let config = save(&state, patch).await?;
    Ok(Json(json!({ "success": true, "config": config })))
}

async fn save(state: &AppState, patch: BackendConfigPatch) -> Result<BackendConfig, ApiError> {
    let store = state.config.clone();
    let saved = tokio::task::spawn_blocking(move || store.set(&patch))
        .await
        .map_err(|err| {
            ApiError::from(core_types::RelayError::ConfigPersistenceFailure(
                err.to_string(),
            ))
        })??;
    Ok(saved)
}

pub(crate) async fn status(State(state): State<Arc<AppState>>) -> Json<StatusReport> {
    let config = state.config.snapshot();
    Json(state.checker.check(&config.ollama.api_host).await)
}

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

pub(crate) async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.config.snapshot();
    let current = config.ollama.default_model.clone();
    match state.backends.ollama(&config).list_models().await {
        Ok(models) => Json(json!({ "models": models, "currentModel": current })),
        Err(err) => {
            warn!(host = %config.ollama.api_host, "failed to list models: {err}");
            Json(json!({ "models": [], "currentModel": current, "error": err.to_string() }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelectModel {
    #[serde(default)]
    model: String,
}

pub(crate) async fn select_model(
    State(state): State<Arc<AppState>>,
    payload: Payload<SelectModel>,
) -> Result<Json<Value>, ApiError> {
    let Json(SelectModel { model }) = payload?;
    let model = model.trim().to_string();
    if model.is_empty() {
        return Err(ApiError::invalid("model name is required"));
    }

    let patch = BackendConfigPatch {
        ollama: Some(OllamaPatch {
            default_model: Some(model.clone()),
            ..OllamaPatch::default()
        }),
        ..BackendConfigPatch::default()
    };
    save(&state, patch).await?;
    info!(model = %model, "default model selected");
    Ok(Json(json!({ "success": true, "currentModel": model })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CloneRequest {
    #[serde(default)]
    repo_url: String,
}

pub(crate) async fn clone_repository(
    State(state): State<Arc<AppState>>,
    payload: Payload<CloneRequest>,
) -> Result<Json<Value>, ApiError> {
    let Json(CloneRequest { repo_url }) = payload?;
    if repo_url.trim().is_empty() {
        return Err(ApiError::invalid("Repository URL is required"));
    }
    let repo = parse_repo_url(&repo_url)?;
    let files = state.cloner.clone_repo(&repo).await?;
    Ok(Json(json!({ "files": files })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadRequest {
    #[serde(default)]
    files: Vec<UploadedFile>,
}

pub(crate) async fn upload_files(payload: Payload<UploadRequest>) -> Result<Json<NormalizedUpload>, ApiError> {
    let Json(UploadRequest { files }) = payload?;
    if files.is_empty() {
        return Err(ApiError::invalid("no files uploaded"));
    }
    Ok(Json(normalize_uploads(files).await?))
}
