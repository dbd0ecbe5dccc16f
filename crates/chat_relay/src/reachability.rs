use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Offline,
    Error,
}

/// Model host state as reported to clients: it either answers or it doesn't.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub online: bool,
    pub backend_status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_status: Option<HostStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
enum Probe {
    Online,
    Failed(u16),
    Unreachable(String),
}

impl Probe {
    fn status(&self) -> ProbeStatus {
        match self {
            Probe::Online => ProbeStatus::Online,
            Probe::Failed(_) => ProbeStatus::Error,
            Probe::Unreachable(_) => ProbeStatus::Offline,
        }
    }

    fn host_status(&self) -> HostStatus {
        match self {
            Probe::Online => HostStatus::Online,
            Probe::Failed(_) | Probe::Unreachable(_) => HostStatus::Offline,
        }
    }

    fn describe(&self, what: &str) -> Option<String> {
        match self {
            Probe::Online => None,
            Probe::Failed(status) => Some(format!("{what} error: {status}")),
            Probe::Unreachable(reason) => Some(format!("{what} unreachable: {reason}")),
        }
    }
}

/// Probes the intermediary server (when it runs separately) and the model
/// host. Each probe is bounded by its own timeout and never fails the caller.
#[derive(Debug, Clone)]
pub struct ReachabilityChecker {
    client: Client,
    backend_url: Option<String>,
    timeout: Duration,
}

impl ReachabilityChecker {
    pub fn new(client: Client, backend_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            backend_url: backend_url.map(|url| url.trim_end_matches('/').to_string()),
            timeout,
        }
    }

    pub async fn check(&self, ollama_host: &str) -> StatusReport {
        let ollama_url = format!("{}/api/tags", ollama_host.trim_end_matches('/'));

        if let Some(backend_url) = &self.backend_url {
            let backend = self.probe(&format!("{backend_url}/health")).await;
            if !matches!(backend, Probe::Online) {
                return StatusReport {
                    online: false,
                    backend_status: backend.status(),
                    ollama_status: None,
                    error: backend.describe("Backend"),
                    timestamp: Utc::now(),
                };
            }
        }

        let ollama = self.probe(&ollama_url).await;
        StatusReport {
            online: matches!(ollama, Probe::Online),
            backend_status: ProbeStatus::Online,
            ollama_status: Some(ollama.host_status()),
            error: ollama.describe("Model host"),
            timestamp: Utc::now(),
        }
    }

    async fn probe(&self, url: &str) -> Probe {
        let probe = match tokio::time::timeout(self.timeout, self.client.get(url).send()).await {
            Err(_) => Probe::Unreachable(format!("no response within {}ms", self.timeout.as_millis())),
            Ok(Err(err)) => Probe::Unreachable(err.to_string()),
            Ok(Ok(response)) if response.status().is_success() => Probe::Online,
            Ok(Ok(response)) => Probe::Failed(response.status().as_u16()),
        };
        debug!(url, result = ?probe, "reachability probe");
        probe
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    fn dead_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        format!("http://{addr}")
    }

    fn checker(backend_url: Option<String>) -> ReachabilityChecker {
        ReachabilityChecker::new(Client::new(), backend_url, Duration::from_millis(500))
    }

    #[tokio::test]
    async fn online_when_model_host_answers() {
        let host = serve(Router::new().route("/api/tags", get(|| async { "{\"models\":[]}" }))).await;
        let report = checker(None).check(&host).await;
        assert!(report.online);
        assert_eq!(report.ollama_status, Some(HostStatus::Online));
        assert_eq!(report.error, None);
    }

    #[tokio::test]
    async fn offline_model_host_is_reported() {
        let report = checker(None).check(&dead_url()).await;
        assert!(!report.online);
        assert_eq!(report.backend_status, ProbeStatus::Online);
        assert_eq!(report.ollama_status, Some(HostStatus::Offline));
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn failing_intermediary_short_circuits() {
        let backend = serve(Router::new().route(
            "/health",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        let report = checker(Some(backend)).check(&dead_url()).await;
        assert!(!report.online);
        assert_eq!(report.backend_status, ProbeStatus::Error);
        assert_eq!(report.ollama_status, None);
        assert_eq!(report.error.as_deref(), Some("Backend error: 500"));
    }

    #[tokio::test]
    async fn model_host_error_status_counts_as_offline() {
        let host = serve(Router::new().route(
            "/api/tags",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        let report = checker(None).check(&host).await;
        assert!(!report.online);
        assert_eq!(report.backend_status, ProbeStatus::Online);
        assert_eq!(report.ollama_status, Some(HostStatus::Offline));
        assert_eq!(report.error.as_deref(), Some("Model host error: 500"));

        let value = serde_json::to_value(&report).expect("json");
        assert_eq!(value["ollamaStatus"], "offline");
    }

    #[tokio::test]
    async fn slow_host_counts_as_offline() {
        let host = serve(Router::new().route(
            "/api/tags",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;
        let checker = ReachabilityChecker::new(Client::new(), None, Duration::from_millis(100));
        let report = checker.check(&host).await;
        assert_eq!(report.ollama_status, Some(HostStatus::Offline));
    }

    #[test]
    fn serializes_camel_case() {
        let report = StatusReport {
            online: false,
            backend_status: ProbeStatus::Offline,
            ollama_status: None,
            error: Some("down".into()),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&report).expect("json");
        assert_eq!(value["backendStatus"], "offline");
        assert!(value.get("ollamaStatus").is_none());
    }
}
