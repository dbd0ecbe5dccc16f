use std::sync::Arc;
use std::time::Duration;

use config::BackendConfig;
use core_types::{BackendKind, ChatBackend, RelayError};
use provider_ollama::{AllHandsBackend, OllamaBackend};
use reqwest::Client;

/// Picks the backend a request should go to, given the current configuration.
pub trait BackendResolver: Send + Sync {
    fn resolve(&self, config: &BackendConfig) -> Result<Arc<dyn ChatBackend>, RelayError>;
}

/// Resolves to the HTTP backends, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpBackends {
    client: Client,
    connect_timeout: Duration,
}

impl HttpBackends {
    pub fn new(client: Client, connect_timeout: Duration) -> Self {
        Self {
            client,
            connect_timeout,
        }
    }

    pub fn ollama(&self, config: &BackendConfig) -> OllamaBackend {
        OllamaBackend::new(
            self.client.clone(),
            config.ollama.api_host.clone(),
            self.connect_timeout,
        )
    }
}

impl BackendResolver for HttpBackends {
    fn resolve(&self, config: &BackendConfig) -> Result<Arc<dyn ChatBackend>, RelayError> {
        match config.preferred_backend {
            BackendKind::Ollama => Ok(Arc::new(self.ollama(config))),
            BackendKind::Allhands => Ok(Arc::new(AllHandsBackend::new(
                self.client.clone(),
                config.allhands.api_url.clone(),
                config.allhands.api_key.as_deref(),
                self.connect_timeout,
            )?)),
        }
    }
}

/// Model the configuration names for its preferred backend.
pub fn default_model(config: &BackendConfig) -> &str {
    match config.preferred_backend {
        BackendKind::Ollama => &config.ollama.default_model,
        BackendKind::Allhands => &config.allhands.default_model,
    }
}
