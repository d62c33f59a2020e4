//! HTTP client for device status documents.
//!
//! One bounded-timeout GET per call, no retries: a failed fetch simply
//! fails the current poll cycle and the poller tries again next cycle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

// ---

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("device answered HTTP {0}")]
    HttpStatus(StatusCode),

    #[error("response is not valid JSON: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Source of raw status documents, one per device URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError>;
}

/// reqwest-backed device client shared by every poller.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    // ---
    http: reqwest::Client,
}

impl DeviceClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        // ---
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Fetch for DeviceClient {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        // ---
        tracing::debug!("Fetching {}", url);

        let response = self.http.get(url).send().await.map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status));
        }

        response.json::<Value>().await.map_err(|e| {
            // A body cut short by the timeout is a transport failure, not bad JSON
            if e.is_decode() {
                FetchError::Decode(e)
            } else {
                FetchError::Network(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;

    /// Serve a tiny fake device on an ephemeral port.
    async fn spawn_device() -> SocketAddr {
        // ---
        let app = Router::new()
            .route(
                "/status.json",
                get(|| async { Json(json!({ "general": { "serialNumber": "RA-1" } })) }),
            )
            .route("/broken.json", get(|| async { "<html>not json</html>" }))
            .route(
                "/error.json",
                get(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "busy") }),
            )
            .route(
                "/slow.json",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({}))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client() -> DeviceClient {
        DeviceClient::new(Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_document() {
        // ---
        let addr = spawn_device().await;
        let doc = tokio_test::assert_ok!(
            client()
                .fetch(&format!("http://{addr}/status.json"))
                .await
        );

        assert_eq!(doc["general"]["serialNumber"], "RA-1");
    }

    #[tokio::test]
    async fn test_non_success_status_is_http_status_error() {
        // ---
        let addr = spawn_device().await;
        let err = client()
            .fetch(&format!("http://{addr}/error.json"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus(s) if s == StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_invalid_body_is_decode_error() {
        // ---
        let addr = spawn_device().await;
        let err = client()
            .fetch(&format!("http://{addr}/broken.json"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        // ---
        let addr = spawn_device().await;
        let err = client()
            .fetch(&format!("http://{addr}/slow.json"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        // ---
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client()
            .fetch(&format!("http://{addr}/status.json"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
    }
}
