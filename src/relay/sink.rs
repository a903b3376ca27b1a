//! Delivery sinks: push these bytes to that connection.
//!
//! [`HttpPushSink`] posts to a connection-management endpoint
//! (`POST {endpoint}/@connections/{connection_id}`), the way a managed
//! WebSocket gateway exposes its live connections. Other sinks (the
//! in-process socket registry, test recorders) implement the same trait.
//!
//! Sinks never retry and never reconnect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

/// Where a push goes: one live connection behind one push endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub connection_id: String,
    pub push_endpoint: Arc<str>,
}

impl ConnectionTarget {
    pub fn new(connection_id: impl Into<String>, push_endpoint: Arc<str>) -> Self {
        Self { connection_id: connection_id.into(), push_endpoint }
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    /// The connection no longer exists on the far side.
    #[error("connection {0} is gone")]
    Gone(String),
    /// The endpoint answered with an unexpected status.
    #[error("push rejected with HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    /// The endpoint could not be reached.
    #[error("push transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn push(&self, target: &ConnectionTarget, data: &[u8]) -> Result<(), PushError>;
}

// ── HttpPushSink ──────────────────────────────────────────────────────────────

/// Pushes through a connection-management HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpPushSink {
    client: Client,
}

impl HttpPushSink {
    pub fn new(timeout_seconds: u64) -> Result<Self, PushError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| PushError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn url(target: &ConnectionTarget) -> String {
        format!(
            "{}/@connections/{}",
            target.push_endpoint.trim_end_matches('/'),
            target.connection_id
        )
    }
}

#[async_trait]
impl DeliverySink for HttpPushSink {
    async fn push(&self, target: &ConnectionTarget, data: &[u8]) -> Result<(), PushError> {
        let url = Self::url(target);
        debug!(connection_id = %target.connection_id, bytes = data.len(), "pushing to connection");

        let response = self
            .client
            .post(&url)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| {
                warn!(%url, error = %e, "push transport failed");
                PushError::Transport(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::GONE || status == StatusCode::NOT_FOUND {
            warn!(connection_id = %target.connection_id, %status, "connection gone");
            return Err(PushError::Gone(target.connection_id.clone()));
        }

        let body = response.text().await.unwrap_or_default();
        warn!(%url, %status, "push rejected");
        Err(PushError::Rejected { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Bytes,
        extract::{Path, State},
        http::StatusCode as AxumStatus,
        routing::post,
    };
    use std::sync::Mutex;

    type Received = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

    async fn spawn_endpoint(received: Received) -> Arc<str> {
        async fn accept(
            State(received): State<Received>,
            Path(id): Path<String>,
            body: Bytes,
        ) -> AxumStatus {
            if id == "gone" {
                return AxumStatus::GONE;
            }
            if id == "broken" {
                return AxumStatus::INTERNAL_SERVER_ERROR;
            }
            received.lock().unwrap().push((id, body.to_vec()));
            AxumStatus::OK
        }

        let router = Router::new()
            .route("/prod/@connections/{id}", post(accept))
            .with_state(received);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Arc::from(format!("http://{addr}/prod"))
    }

    #[test]
    fn url_joins_endpoint_and_connection() {
        let t = ConnectionTarget::new("abc=", Arc::from("https://gw.example/prod/"));
        assert_eq!(HttpPushSink::url(&t), "https://gw.example/prod/@connections/abc=");
    }

    #[tokio::test]
    async fn push_posts_raw_bytes() {
        let received: Received = Arc::default();
        let endpoint = spawn_endpoint(received.clone()).await;
        let sink = HttpPushSink::new(5).unwrap();

        sink.push(&ConnectionTarget::new("c1", endpoint.clone()), b"123").await.unwrap();
        sink.push(&ConnectionTarget::new("c1", endpoint), b"<END>").await.unwrap();

        let got = received.lock().unwrap().clone();
        assert_eq!(got, vec![("c1".to_string(), b"123".to_vec()), ("c1".to_string(), b"<END>".to_vec())]);
    }

    #[tokio::test]
    async fn gone_connection_reported() {
        let endpoint = spawn_endpoint(Arc::default()).await;
        let sink = HttpPushSink::new(5).unwrap();
        let err = sink.push(&ConnectionTarget::new("gone", endpoint), b"x").await.unwrap_err();
        assert!(matches!(err, PushError::Gone(id) if id == "gone"));
    }

    #[tokio::test]
    async fn server_error_is_rejected() {
        let endpoint = spawn_endpoint(Arc::default()).await;
        let sink = HttpPushSink::new(5).unwrap();
        let err = sink.push(&ConnectionTarget::new("broken", endpoint), b"x").await.unwrap_err();
        assert!(matches!(err, PushError::Rejected { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let sink = HttpPushSink::new(1).unwrap();
        let target = ConnectionTarget::new("c", Arc::from("http://127.0.0.1:9"));
        assert!(matches!(sink.push(&target, b"x").await, Err(PushError::Transport(_))));
    }
}
