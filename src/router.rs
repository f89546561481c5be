//! Per-connection message routing.
//!
//! Each connection is a tiny state machine: it starts unauthenticated, and
//! a well-formed AUTH moves it (one-way) to authenticated. Every other
//! message requires the authenticated state. The five message kinds are
//! dispatched by exhaustive match, so adding a kind is a compile-time
//! enumeration extension.

use tracing::{debug, info, warn};

use crate::dispatch::{
    self, BrandResearchDispatch, CompetitorResearchDispatch, ProductDispatch,
    PromptGenerationDispatch,
};
use crate::jobs::{BrandResearchJob, CompetitorResearchJob, ProductJob, PromptGenerationJob};
use crate::protocol::{ClientMessage, Decoded, JobKind, ServerMessage, decode_client_frame};
use crate::registry::ConnectionHandle;
use crate::server::SharedState;

/// Mutable per-connection state, owned by the socket task.
///
/// The user id is set once, on the first successful AUTH, and never
/// changes; re-authenticating as someone else requires a new connection.
#[derive(Debug, Default)]
pub struct ConnectionSession {
    pub user_id: Option<String>,
}

impl ConnectionSession {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Handle one raw text frame from the client.
pub async fn handle_frame(
    state: &SharedState,
    conn: &ConnectionHandle,
    session: &mut ConnectionSession,
    text: &str,
) {
    match decode_client_frame(text) {
        Decoded::Message(msg) => handle_message(state, conn, session, msg).await,
        Decoded::UnknownType(tag) => {
            // Lenient by design: newer clients may send kinds we don't know.
            debug!(message_type = %tag, "ignoring unknown message type");
        }
        Decoded::Invalid => {
            conn.send(&ServerMessage::error("Invalid message format"));
        }
    }
}

async fn handle_message(
    state: &SharedState,
    conn: &ConnectionHandle,
    session: &mut ConnectionSession,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::Auth { user_id } => handle_auth(state, conn, session, user_id).await,

        ClientMessage::SubmitProduct {
            product_id,
            product_name,
        } => {
            let Some(user_id) = require_auth(session, conn) else {
                return;
            };
            state
                .jobs
                .products
                .put(
                    &product_id,
                    &user_id,
                    ProductJob {
                        product_name: product_name.clone(),
                    },
                )
                .await;
            conn.send(&ServerMessage::ProductReceived {
                product_id: product_id.clone(),
                status: "processing".to_string(),
            });
            let body = ProductDispatch {
                product_id: product_id.clone(),
                user_id,
                product_name,
                callback_url: state.config.callback_url(JobKind::Product),
            };
            dispatch::spawn_dispatch(state.clone(), conn.clone(), JobKind::Product, product_id, body);
        }

        ClientMessage::ResearchBrand {
            request_id,
            website_url,
            brand_name,
        } => {
            let Some(user_id) = require_auth(session, conn) else {
                return;
            };
            state
                .jobs
                .brand_research
                .put(
                    &request_id,
                    &user_id,
                    BrandResearchJob {
                        website_url: website_url.clone(),
                        brand_name: brand_name.clone(),
                    },
                )
                .await;
            conn.send(&ServerMessage::BrandResearchStarted {
                request_id: request_id.clone(),
            });
            let body = BrandResearchDispatch {
                request_id: request_id.clone(),
                user_id,
                website_url,
                brand_name,
                callback_url: state.config.callback_url(JobKind::BrandResearch),
            };
            dispatch::spawn_dispatch(
                state.clone(),
                conn.clone(),
                JobKind::BrandResearch,
                request_id,
                body,
            );
        }

        ClientMessage::ResearchCompetitors {
            request_id,
            brand_name,
            brand_description,
            industry,
            topics,
        } => {
            let Some(user_id) = require_auth(session, conn) else {
                return;
            };
            state
                .jobs
                .competitor_research
                .put(
                    &request_id,
                    &user_id,
                    CompetitorResearchJob {
                        brand_name: brand_name.clone(),
                        brand_description: brand_description.clone(),
                        industry: industry.clone(),
                        topics: topics.clone(),
                    },
                )
                .await;
            conn.send(&ServerMessage::CompetitorResearchStarted {
                request_id: request_id.clone(),
            });
            let body = CompetitorResearchDispatch {
                request_id: request_id.clone(),
                user_id,
                brand_name,
                brand_description,
                industry,
                topics,
                callback_url: state.config.callback_url(JobKind::CompetitorResearch),
            };
            dispatch::spawn_dispatch(
                state.clone(),
                conn.clone(),
                JobKind::CompetitorResearch,
                request_id,
                body,
            );
        }

        ClientMessage::GeneratePrompts {
            request_id,
            brand_id,
            brand_name,
            brand_description,
            topics,
            competitors,
            organization_id,
            num_topics,
            prompts_per_topic,
            use_fast_mode,
        } => {
            let Some(user_id) = require_auth(session, conn) else {
                return;
            };
            state
                .jobs
                .prompt_generation
                .put(
                    &request_id,
                    &user_id,
                    PromptGenerationJob {
                        brand_id: brand_id.clone(),
                        brand_name: brand_name.clone(),
                        brand_description: brand_description.clone(),
                        topics: topics.clone(),
                        competitors: competitors.clone(),
                        organization_id: organization_id.clone(),
                        num_topics,
                        prompts_per_topic,
                        use_fast_mode,
                    },
                )
                .await;
            conn.send(&ServerMessage::PromptGenerationStarted {
                request_id: request_id.clone(),
            });
            let body = PromptGenerationDispatch {
                request_id: request_id.clone(),
                user_id,
                brand_id,
                brand_name,
                brand_description,
                topics,
                competitors,
                organization_id,
                num_topics,
                prompts_per_topic,
                use_fast_mode,
                callback_url: state.config.callback_url(JobKind::PromptGeneration),
            };
            dispatch::spawn_dispatch(
                state.clone(),
                conn.clone(),
                JobKind::PromptGeneration,
                request_id,
                body,
            );
        }
    }
}

async fn handle_auth(
    state: &SharedState,
    conn: &ConnectionHandle,
    session: &mut ConnectionSession,
    user_id: String,
) {
    if user_id.is_empty() {
        conn.send(&ServerMessage::error("userId is required"));
        return;
    }

    match &session.user_id {
        None => {
            session.user_id = Some(user_id.clone());
            state.registry.register(&user_id, conn.clone()).await;
            info!(user = %user_id, "connection authenticated");
        }
        Some(existing) if *existing != user_id => {
            // The ownership tag never changes once set.
            warn!(
                user = %existing,
                requested = %user_id,
                "ignoring re-AUTH with different user id"
            );
        }
        Some(_) => {}
    }

    conn.send(&ServerMessage::AuthSuccess {
        message: "Connected successfully".to_string(),
    });
}

fn require_auth(session: &ConnectionSession, conn: &ConnectionHandle) -> Option<String> {
    match &session.user_id {
        Some(user_id) => Some(user_id.clone()),
        None => {
            conn.send(&ServerMessage::error("Not authenticated"));
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
