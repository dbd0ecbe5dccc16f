use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_types::{BackendKind, SECRET_MASK};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

mod settings;

pub use settings::ServerSettings;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_ALLHANDS_URL: &str = "https://api.allhands.ai";
pub const DEFAULT_ALLHANDS_MODEL: &str = "default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {message}")]
    Persist { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OllamaSettings {
    pub api_host: String,
    pub default_model: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_OLLAMA_HOST.to_string(),
            default_model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllHandsSettings {
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_allhands_model")]
    pub default_model: String,
}

impl Default for AllHandsSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_ALLHANDS_URL.to_string(),
            api_key: None,
            default_model: default_allhands_model(),
        }
    }
}

fn default_allhands_model() -> String {
    DEFAULT_ALLHANDS_MODEL.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    #[serde(default = "enabled")]
    pub file_attachments: bool,
    #[serde(default = "enabled")]
    pub code_execution: bool,
    #[serde(default = "enabled")]
    pub project_explorer: bool,
}

const fn enabled() -> bool {
    true
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            file_attachments: true,
            code_execution: true,
            project_explorer: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    #[serde(default)]
    pub ollama: OllamaSettings,
    #[serde(default)]
    pub allhands: AllHandsSettings,
    #[serde(default)]
    pub preferred_backend: BackendKind,
    #[serde(default)]
    pub features: FeatureFlags,
}

impl BackendConfig {
    /// Hard-coded defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();
        if let Some(host) = non_empty("OLLAMA_API_HOST") {
            config.ollama.api_host = host;
        }
        if let Some(model) = non_empty("OLLAMA_MODEL") {
            config.ollama.default_model = model;
        }
        if let Some(url) = non_empty("ALLHANDS_API_URL") {
            config.allhands.api_url = url;
        }
        config.allhands.api_key = non_empty("ALLHANDS_API_KEY");
        config
    }

    /// Copy safe to hand to a UI: the API key is replaced by [`SECRET_MASK`].
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if masked.allhands.api_key.is_some() {
            masked.allhands.api_key = Some(SECRET_MASK.to_string());
        }
        masked
    }

    /// Applies `patch` one level deep: each section present in the patch
    /// overrides only the keys it carries.
    pub fn merge(&self, patch: &BackendConfigPatch) -> Self {
        let mut merged = self.clone();
        if let Some(ollama) = &patch.ollama {
            if let Some(api_host) = &ollama.api_host {
                merged.ollama.api_host = api_host.clone();
            }
            if let Some(default_model) = &ollama.default_model {
                merged.ollama.default_model = default_model.clone();
            }
        }
        if let Some(allhands) = &patch.allhands {
            if let Some(api_url) = &allhands.api_url {
                merged.allhands.api_url = api_url.clone();
            }
            match allhands.api_key.as_deref() {
                Some(SECRET_MASK) | None => {}
                Some("") => merged.allhands.api_key = None,
                Some(key) => merged.allhands.api_key = Some(key.to_string()),
            }
            if let Some(default_model) = &allhands.default_model {
                merged.allhands.default_model = default_model.clone();
            }
        }
        if let Some(preferred) = patch.preferred_backend {
            merged.preferred_backend = preferred;
        }
        if let Some(features) = &patch.features {
            if let Some(value) = features.file_attachments {
                merged.features.file_attachments = value;
            }
            if let Some(value) = features.code_execution {
                merged.features.code_execution = value;
            }
            if let Some(value) = features.project_explorer {
                merged.features.project_explorer = value;
            }
        }
        merged
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("ollama.apiHost", &self.ollama.api_host)?;
        validate_url("allhands.apiUrl", &self.allhands.api_url)?;
        if self.ollama.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "ollama.defaultModel must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be an http(s) URL, got `{value}`"
        )))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfigPatch {
    #[serde(default)]
    pub ollama: Option<OllamaPatch>,
    #[serde(default)]
    pub allhands: Option<AllHandsPatch>,
    #[serde(default)]
    pub preferred_backend: Option<BackendKind>,
    #[serde(default)]
    pub features: Option<FeatureFlagsPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OllamaPatch {
    pub api_host: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllHandsPatch {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagsPatch {
    pub file_attachments: Option<bool>,
    pub code_execution: Option<bool>,
    pub project_explorer: Option<bool>,
}

/// Flat-file store for the single [`BackendConfig`] document.
///
/// The in-memory snapshot only moves after the file has been written, so it
/// never reflects a document that failed to persist.
pub struct ConfigStore {
    path: PathBuf,
    defaults: BackendConfig,
    snapshot: RwLock<Arc<BackendConfig>>,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, defaults: BackendConfig) -> Self {
        let store = Self {
            path: path.into(),
            snapshot: RwLock::new(Arc::new(defaults.clone())),
            defaults,
            write_lock: Mutex::new(()),
        };
        match store.load() {
            Ok(Some(config)) => *store.snapshot.write() = Arc::new(config),
            Ok(None) => info!(path = %store.path.display(), "no config file, using defaults"),
            Err(err) => warn!("failed to load config, using defaults: {err}"),
        }
        store
    }

    pub fn from_dir(dir: impl AsRef<Path>, defaults: BackendConfig) -> Self {
        Self::new(dir.as_ref().join(CONFIG_FILE_NAME), defaults)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defaults the store was built with, environment overrides included.
    pub fn defaults(&self) -> &BackendConfig {
        &self.defaults
    }

    /// Unmasked document as last loaded or written.
    pub fn snapshot(&self) -> Arc<BackendConfig> {
        self.snapshot.read().clone()
    }

    /// Re-reads the file and returns the masked document. Falls back to the
    /// defaults when the file is missing or unreadable.
    pub fn get(&self) -> BackendConfig {
        match self.load() {
            Ok(Some(config)) => {
                let masked = config.masked();
                *self.snapshot.write() = Arc::new(config);
                masked
            }
            Ok(None) => self.defaults.masked(),
            Err(err) => {
                warn!("failed to read config, serving defaults: {err}");
                self.defaults.masked()
            }
        }
    }

    /// Merges `patch` into the stored document, persists it, and returns the
    /// merged document masked.
    pub fn set(&self, patch: &BackendConfigPatch) -> Result<BackendConfig, ConfigError> {
        let _guard = self.write_lock.lock();
        let current = match self.load() {
            Ok(Some(config)) => config,
            Ok(None) => self.defaults.clone(),
            Err(err) => {
                warn!("stored config unreadable, merging into last known document: {err}");
                self.snapshot().as_ref().clone()
            }
        };

        let merged = current.merge(patch);
        merged.validate()?;
        self.persist(&merged)?;
        info!(
            path = %self.path.display(),
            backend = merged.preferred_backend.as_str(),
            model = %merged.ollama.default_model,
            "configuration saved"
        );

        let masked = merged.masked();
        *self.snapshot.write() = Arc::new(merged);
        Ok(masked)
    }

    fn load(&self) -> Result<Option<BackendConfig>, ConfigError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    fn persist(&self, config: &BackendConfig) -> Result<(), ConfigError> {
        let persist_err = |message: String| ConfigError::Persist {
            path: self.path.clone(),
            message,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|err| persist_err(format!("create {}: {err}", dir.display())))?;

        let text = serde_json::to_string_pretty(config)
            .map_err(|err| persist_err(format!("serialize: {err}")))?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|err| persist_err(format!("temp file: {err}")))?;
        file.write_all(text.as_bytes())
            .map_err(|err| persist_err(err.to_string()))?;
        file.persist(&self.path)
            .map_err(|err| persist_err(err.error.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn patch(json: &str) -> BackendConfigPatch {
        serde_json::from_str(json).expect("patch")
    }

    #[test]
    fn returns_defaults_when_missing() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path(), BackendConfig::default());
        let config = store.get();
        assert_eq!(config.ollama.api_host, DEFAULT_OLLAMA_HOST);
        assert_eq!(config.preferred_backend, BackendKind::Ollama);
        assert!(!store.path().exists());
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path(), BackendConfig::default());
        store
            .set(&patch(r#"{"ollama":{"apiHost":"http://gpu-box:11434"}}"#))
            .expect("first set");

        let merged = store
            .set(&patch(r#"{"ollama":{"defaultModel":"mistral"}}"#))
            .expect("second set");
        assert_eq!(merged.ollama.default_model, "mistral");

        let reread = ConfigStore::from_dir(dir.path(), BackendConfig::default()).get();
        assert_eq!(reread.ollama.default_model, "mistral");
        assert_eq!(reread.ollama.api_host, "http://gpu-box:11434");
        assert_eq!(reread.allhands, AllHandsSettings::default());
        assert_eq!(reread.features, FeatureFlags::default());
    }

    #[test]
    fn feature_patch_keeps_unspecified_flags() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path(), BackendConfig::default());
        let merged = store
            .set(&patch(r#"{"features":{"codeExecution":false}}"#))
            .expect("set");
        assert!(!merged.features.code_execution);
        assert!(merged.features.file_attachments);
        assert!(merged.features.project_explorer);
    }

    #[test]
    fn masks_api_key_and_ignores_echoed_mask() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path(), BackendConfig::default());
        let saved = store
            .set(&patch(r#"{"allhands":{"apiKey":"sk-real-secret"}}"#))
            .expect("set");
        assert_eq!(saved.allhands.api_key.as_deref(), Some(SECRET_MASK));

        let echoed = store.get();
        assert_ne!(echoed.allhands.api_key.as_deref(), Some("sk-real-secret"));
        store
            .set(&patch(r#"{"allhands":{"apiKey":"********"}}"#))
            .expect("echo");
        assert_eq!(
            store.snapshot().allhands.api_key.as_deref(),
            Some("sk-real-secret")
        );
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = serde_json::from_str::<BackendConfigPatch>(r#"{"preferredBackend":"openai"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_invalid_url_without_writing() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path(), BackendConfig::default());
        let err = store
            .set(&patch(r#"{"ollama":{"apiHost":"localhost"}}"#))
            .expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(!store.path().exists());
    }

    #[test]
    fn failed_write_leaves_snapshot_untouched() {
        let dir = tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").expect("blocker");
        let store = ConfigStore::new(blocker.join(CONFIG_FILE_NAME), BackendConfig::default());

        let err = store
            .set(&patch(r#"{"ollama":{"defaultModel":"mistral"}}"#))
            .expect_err("write must fail");
        assert!(matches!(err, ConfigError::Persist { .. }));
        assert_eq!(store.snapshot().ollama.default_model, DEFAULT_OLLAMA_MODEL);
    }

    #[test]
    fn env_lookup_seeds_defaults() {
        let config = BackendConfig::from_lookup(|key| match key {
            "OLLAMA_API_HOST" => Some("http://ollama:11434".to_string()),
            "OLLAMA_MODEL" => Some("qwen2.5-coder".to_string()),
            "ALLHANDS_API_KEY" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.ollama.api_host, "http://ollama:11434");
        assert_eq!(config.ollama.default_model, "qwen2.5-coder");
        assert_eq!(config.allhands.api_key, None);
        assert_eq!(config.allhands.api_url, DEFAULT_ALLHANDS_URL);
    }

    #[test]
    fn keeps_env_seeded_defaults() {
        let dir = tempdir().expect("tempdir");
        let seeded = BackendConfig::from_lookup(|key| match key {
            "OLLAMA_API_HOST" => Some("http://ollama:11434".to_string()),
            "ALLHANDS_API_KEY" => Some("sk-env".to_string()),
            _ => None,
        });
        let store = ConfigStore::from_dir(dir.path(), seeded);
        store.set(&patch(r#"{"ollama":{"defaultModel":"mistral"}}"#)).expect("set");

        let defaults = store.defaults().masked();
        assert_eq!(defaults.ollama.api_host, "http://ollama:11434");
        assert_eq!(defaults.ollama.default_model, DEFAULT_OLLAMA_MODEL);
        assert_eq!(defaults.allhands.api_key.as_deref(), Some(SECRET_MASK));
    }
}
