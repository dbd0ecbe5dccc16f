use reqwest::{Client, Request, Response};
use thiserror::Error;

use crate::{Backoff, retry};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("server error: {status}")]
    ServerError { status: u16 },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request body cannot be replayed")]
    NotReplayable,
}

impl FetchError {
    fn is_retriable(&self) -> bool {
        match self {
            FetchError::ServerError { .. } => true,
            FetchError::Transport(err) => !err.is_builder(),
            FetchError::NotReplayable => false,
        }
    }
}

/// Sends `request`, retrying on 5xx responses and transport failures.
///
/// Any other response, including 4xx, is returned to the caller as-is. A request
/// whose body cannot be cloned is sent exactly once.
pub async fn fetch_with_retry(
    client: &Client,
    request: Request,
    max_attempts: u32,
    backoff: Backoff,
) -> Result<Response, FetchError> {
    if request.try_clone().is_none() {
        return send_once(client, request).await;
    }

    retry(
        max_attempts,
        backoff,
        |_| {
            let attempt = request.try_clone();
            async move { send_once(client, attempt.ok_or(FetchError::NotReplayable)?).await }
        },
        FetchError::is_retriable,
    )
    .await
}

async fn send_once(client: &Client, request: Request) -> Result<Response, FetchError> {
    let response = client.execute(request).await?;
    let status = response.status();
    if status.is_server_error() {
        return Err(FetchError::ServerError {
            status: status.as_u16(),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

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

    fn fast() -> Backoff {
        Backoff::linear(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/flaky",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::OK
                    }
                }
            }),
        ))
        .await;

        let client = Client::new();
        let request = client.get(format!("{base}/flaky")).build().expect("request");
        let response = fetch_with_retry(&client, request, 3, fast())
            .await
            .expect("response");
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn never_retries_client_errors() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/missing",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::NOT_FOUND }
            }),
        ))
        .await;

        let client = Client::new();
        let request = client
            .get(format!("{base}/missing"))
            .build()
            .expect("request");
        let response = fetch_with_retry(&client, request, 3, fast())
            .await
            .expect("4xx is returned, not raised");
        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn surfaces_last_server_error() {
        let base = serve(Router::new().route(
            "/down",
            get(|| async { StatusCode::BAD_GATEWAY }),
        ))
        .await;

        let client = Client::new();
        let request = client.get(format!("{base}/down")).build().expect("request");
        let err = fetch_with_retry(&client, request, 2, fast())
            .await
            .expect_err("exhausted");
        assert!(matches!(err, FetchError::ServerError { status: 502 }));
    }

    #[tokio::test]
    async fn transport_failure_is_retried_and_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let client = Client::new();
        let request = client.get(format!("http://{addr}/")).build().expect("request");
        let err = fetch_with_retry(&client, request, 2, fast())
            .await
            .expect_err("connection refused");
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
