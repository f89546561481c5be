//! Hand-off of accepted submissions to the external workflow engine.
//!
//! The client-facing acknowledgement is sent *before* the HTTP call, so the
//! browser sees progress even when the engine is slow. Each dispatch runs in
//! its own spawned task; a hung engine call never blocks the connection's
//! read loop or other jobs.
//!
//! Failure policy is fail-fast with no retry: a transport error or non-2xx
//! status produces an immediate kind-specific `*_ERROR` frame on the
//! originating connection and removes the pending-job entry. The user
//! resubmits if they still want the job.

use serde::Serialize;
use tracing::{info, warn};

use crate::errors::DispatchError;
use crate::protocol::JobKind;
use crate::registry::ConnectionHandle;
use crate::server::SharedState;

/// Thin wrapper over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct OutboundDispatcher {
    http: reqwest::Client,
}

impl OutboundDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// POST a JSON body to a workflow webhook. Any non-2xx status counts as
    /// a dispatch failure.
    pub async fn post_webhook<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<(), DispatchError> {
        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DispatchError::Status { status });
        }
        Ok(())
    }
}

// ── Webhook bodies ───────────────────────────────────────────────────
//
// snake_case on the wire; the workflow engine contract predates the relay.

#[derive(Debug, Clone, Serialize)]
pub struct ProductDispatch {
    pub product_id: String,
    pub user_id: String,
    pub product_name: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrandResearchDispatch {
    pub request_id: String,
    pub user_id: String,
    pub website_url: String,
    pub brand_name: Option<String>,
    pub callback_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompetitorResearchDispatch {
    pub request_id: String,
    pub user_id: String,
    pub brand_name: String,
    pub brand_description: String,
    pub industry: String,
    pub topics: Vec<String>,
    pub callback_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptGenerationDispatch {
    pub request_id: String,
    pub user_id: String,
    pub brand_id: String,
    pub brand_name: String,
    pub brand_description: String,
    pub topics: Vec<String>,
    pub competitors: Vec<String>,
    pub organization_id: String,
    pub num_topics: u32,
    pub prompts_per_topic: u32,
    pub use_fast_mode: bool,
    pub callback_url: String,
}

/// Fire one dispatch in the background.
///
/// On failure the pending entry for `job_id` is removed and the originating
/// connection (and only that connection) receives the kind's error frame.
pub fn spawn_dispatch<B>(
    state: SharedState,
    conn: ConnectionHandle,
    kind: JobKind,
    job_id: String,
    body: B,
) where
    B: Serialize + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let url = state.config.webhook_url(kind);
        match state.dispatcher.post_webhook(url, &body).await {
            Ok(()) => {
                info!(kind = kind.name(), job_id = %job_id, "dispatched job to workflow engine");
            }
            Err(e) => {
                warn!(kind = kind.name(), job_id = %job_id, "dispatch failed: {e}");
                state.jobs.remove(kind, &job_id).await;
                conn.send(&kind.error_frame(&job_id, kind.dispatch_failure_message()));
            }
        }
    });
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::jobs::ProductJob;
    use crate::server::AppState;
    use axum::{Router, http::StatusCode, routing::post};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Bind a one-route engine stub, or `None` in sandboxes that forbid it.
    async fn spawn_stub(status: StatusCode) -> Option<String> {
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Skipping dispatch test (sandbox): {e}");
                return None;
            }
        };
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/webhook", post(move || async move { status }));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Some(format!("http://{addr}/webhook"))
    }

    #[tokio::test]
    async fn test_post_webhook_success() {
        let Some(url) = spawn_stub(StatusCode::OK).await else {
            return;
        };
        let dispatcher = OutboundDispatcher::new();
        let body = ProductDispatch {
            product_id: "p1".to_string(),
            user_id: "u1".to_string(),
            product_name: "Widget".to_string(),
            callback_url: "http://localhost:3001/api/callbacks/product".to_string(),
        };
        dispatcher.post_webhook(&url, &body).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_webhook_non_2xx_is_error() {
        let Some(url) = spawn_stub(StatusCode::INTERNAL_SERVER_ERROR).await else {
            return;
        };
        let dispatcher = OutboundDispatcher::new();
        let body = serde_json::json!({"request_id": "r1"});
        let err = dispatcher.post_webhook(&url, &body).await.unwrap_err();
        match err {
            DispatchError::Status { status } => {
                assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_webhook_connection_refused_is_error() {
        let dispatcher = OutboundDispatcher::new();
        let body = serde_json::json!({});
        // Port 9 (discard) is near-certain to refuse on localhost.
        let result = dispatcher
            .post_webhook("http://127.0.0.1:9/webhook", &body)
            .await;
        assert!(matches!(result, Err(DispatchError::Request(_))));
    }

    #[tokio::test]
    async fn test_spawn_dispatch_failure_notifies_originating_connection() {
        let config = RelayConfig {
            product_webhook_url: "http://127.0.0.1:9/webhook".to_string(),
            ..RelayConfig::default()
        };
        let state = Arc::new(AppState::new(config));
        state
            .jobs
            .products
            .put("p1", "u1", ProductJob { product_name: "Widget".to_string() })
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = ConnectionHandle::new(tx);
        let body = ProductDispatch {
            product_id: "p1".to_string(),
            user_id: "u1".to_string(),
            product_name: "Widget".to_string(),
            callback_url: "http://localhost:3001/api/callbacks/product".to_string(),
        };
        spawn_dispatch(
            state.clone(),
            conn,
            JobKind::Product,
            "p1".to_string(),
            body,
        );

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for dispatch error frame")
            .expect("connection channel closed");
        assert!(frame.contains("\"type\":\"PRODUCT_ERROR\""));
        assert!(frame.contains("Failed to start product identification"));
        assert!(!state.jobs.products.contains("p1").await);
    }

    #[test]
    fn test_dispatch_bodies_are_snake_case() {
        let body = BrandResearchDispatch {
            request_id: "r1".to_string(),
            user_id: "u1".to_string(),
            website_url: "http://x.com".to_string(),
            brand_name: None,
            callback_url: "http://localhost:3001/api/callbacks/brand-research".to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"request_id\":\"r1\""));
        assert!(json.contains("\"website_url\""));
        assert!(json.contains("\"callback_url\""));
    }

    #[test]
    fn test_prompt_dispatch_carries_defaults() {
        let body = PromptGenerationDispatch {
            request_id: "r1".to_string(),
            user_id: "u1".to_string(),
            brand_id: "b1".to_string(),
            brand_name: "Acme".to_string(),
            brand_description: "Rockets".to_string(),
            topics: vec!["t1".to_string()],
            competitors: vec![],
            organization_id: "o1".to_string(),
            num_topics: 5,
            prompts_per_topic: 5,
            use_fast_mode: true,
            callback_url: "http://localhost:3001/api/callbacks/prompt-generation".to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"num_topics\":5"));
        assert!(json.contains("\"use_fast_mode\":true"));
    }
}
