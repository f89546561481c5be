//! HTTP callbacks from the workflow engine, one route per job kind.
//!
//! The engine reports completion minutes after submission, long after the
//! originating connection may be gone. Delivery is therefore routed by the
//! `user_id` carried in the callback body, never by the connection that
//! submitted the job: every connection the user has live *right now* gets
//! the result. If they have none, the result is dropped — the browser side
//! compensates by polling the authoritative datastore.
//!
//! The relay answers `200 {"success": true}` unconditionally, including for
//! job ids it has no record of (swept, restarted, or duplicate delivery).

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::protocol::JobKind;
use crate::server::SharedState;

/// Callback body for product identification. `data` carries the identified
/// product record on success; `error` a human-readable message on failure.
#[derive(Debug, Deserialize)]
pub struct ProductCallback {
    pub product_id: String,
    pub user_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Callback body shared by the three research/generation kinds.
#[derive(Debug, Deserialize)]
pub struct JobCallback {
    pub request_id: String,
    pub user_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn product_callback(
    State(state): State<SharedState>,
    Json(cb): Json<ProductCallback>,
) -> Json<Value> {
    deliver(
        &state,
        JobKind::Product,
        &cb.product_id,
        &cb.user_id,
        cb.status,
        cb.data,
        cb.error,
        "ready",
    )
    .await;
    Json(json!({"success": true}))
}

pub async fn brand_research_callback(
    State(state): State<SharedState>,
    Json(cb): Json<JobCallback>,
) -> Json<Value> {
    deliver(
        &state,
        JobKind::BrandResearch,
        &cb.request_id,
        &cb.user_id,
        cb.status,
        cb.data,
        cb.error,
        "complete",
    )
    .await;
    Json(json!({"success": true}))
}

pub async fn competitor_research_callback(
    State(state): State<SharedState>,
    Json(cb): Json<JobCallback>,
) -> Json<Value> {
    deliver(
        &state,
        JobKind::CompetitorResearch,
        &cb.request_id,
        &cb.user_id,
        cb.status,
        cb.data,
        cb.error,
        "complete",
    )
    .await;
    Json(json!({"success": true}))
}

pub async fn prompt_generation_callback(
    State(state): State<SharedState>,
    Json(cb): Json<JobCallback>,
) -> Json<Value> {
    deliver(
        &state,
        JobKind::PromptGeneration,
        &cb.request_id,
        &cb.user_id,
        cb.status,
        cb.data,
        cb.error,
        "complete",
    )
    .await;
    Json(json!({"success": true}))
}

/// Fan a callback out to the owning user's live connections, then drop the
/// pending entry. Uniform across all four kinds.
#[allow(clippy::too_many_arguments)]
async fn deliver(
    state: &SharedState,
    kind: JobKind,
    job_id: &str,
    user_id: &str,
    status: Option<String>,
    data: Option<Value>,
    error: Option<String>,
    default_status: &str,
) {
    info!(kind = kind.name(), job_id, user = %user_id, "received workflow callback");

    let frame = if status.as_deref() == Some("error") {
        let message =
            error.unwrap_or_else(|| format!("{} failed", kind.name().replace('-', " ")));
        kind.error_frame(job_id, message)
    } else {
        kind.success_frame(
            job_id,
            status.unwrap_or_else(|| default_status.to_string()),
            data,
        )
    };

    let delivered = state.registry.broadcast(user_id, &frame).await;
    if delivered == 0 {
        debug!(kind = kind.name(), job_id, user = %user_id, "no live connections for callback");
    } else {
        info!(
            kind = kind.name(),
            job_id, delivered, "callback fanned out to live connections"
        );
    }

    // Unknown ids are fine: the broadcast above already happened using the
    // user id from the callback body.
    state.jobs.remove(kind, job_id).await;
}

// ── Tests ────────────────────────────────────────────────────────────
