//! Wire protocol between browser clients and the relay.
//!
//! Every frame is a JSON object discriminated by a `type` field. Tags are
//! SCREAMING_SNAKE_CASE and payload fields are camelCase, matching what the
//! browser-side hooks send and expect. Unrecognized extra fields are ignored
//! by serde's default behavior.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four long-running job kinds the relay tracks.
///
/// Each kind has its own submission message, its own pending-job partition,
/// its own workflow-engine webhook, and its own callback route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Product,
    BrandResearch,
    CompetitorResearch,
    PromptGeneration,
}

impl JobKind {
    /// Short name used in log lines and route paths.
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Product => "product",
            JobKind::BrandResearch => "brand-research",
            JobKind::CompetitorResearch => "competitor-research",
            JobKind::PromptGeneration => "prompt-generation",
        }
    }

    /// Human-readable message sent to the client when dispatch to the
    /// workflow engine fails.
    pub fn dispatch_failure_message(&self) -> &'static str {
        match self {
            JobKind::Product => "Failed to start product identification",
            JobKind::BrandResearch => "Failed to start brand research",
            JobKind::CompetitorResearch => "Failed to start competitor research",
            JobKind::PromptGeneration => "Failed to start prompt generation",
        }
    }

    /// The kind-specific error frame carrying the job id.
    pub fn error_frame(&self, job_id: &str, error: impl Into<String>) -> ServerMessage {
        let error = error.into();
        match self {
            JobKind::Product => ServerMessage::ProductError {
                product_id: job_id.to_string(),
                error,
            },
            JobKind::BrandResearch => ServerMessage::BrandResearchError {
                request_id: job_id.to_string(),
                error,
            },
            JobKind::CompetitorResearch => ServerMessage::CompetitorResearchError {
                request_id: job_id.to_string(),
                error,
            },
            JobKind::PromptGeneration => ServerMessage::PromptGenerationError {
                request_id: job_id.to_string(),
                error,
            },
        }
    }

    /// The kind-specific success frame for a completed job.
    pub fn success_frame(&self, job_id: &str, status: String, data: Option<Value>) -> ServerMessage {
        match self {
            JobKind::Product => ServerMessage::ProductReady {
                product_id: job_id.to_string(),
                status,
                data,
            },
            JobKind::BrandResearch => ServerMessage::BrandResearchComplete {
                request_id: job_id.to_string(),
                status,
                data,
            },
            JobKind::CompetitorResearch => ServerMessage::CompetitorResearchComplete {
                request_id: job_id.to_string(),
                status,
                data,
            },
            JobKind::PromptGeneration => ServerMessage::PromptGenerationComplete {
                request_id: job_id.to_string(),
                status,
                data,
            },
        }
    }
}

// ── Client → server messages ─────────────────────────────────────────

fn default_num_topics() -> u32 {
    5
}

fn default_prompts_per_topic() -> u32 {
    5
}

fn default_use_fast_mode() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Auth { user_id: String },

    #[serde(rename_all = "camelCase")]
    SubmitProduct {
        product_id: String,
        product_name: String,
    },

    #[serde(rename_all = "camelCase")]
    ResearchBrand {
        request_id: String,
        website_url: String,
        #[serde(default)]
        brand_name: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    ResearchCompetitors {
        request_id: String,
        brand_name: String,
        brand_description: String,
        industry: String,
        topics: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    GeneratePrompts {
        request_id: String,
        brand_id: String,
        brand_name: String,
        brand_description: String,
        topics: Vec<String>,
        competitors: Vec<String>,
        organization_id: String,
        #[serde(default = "default_num_topics")]
        num_topics: u32,
        #[serde(default = "default_prompts_per_topic")]
        prompts_per_topic: u32,
        #[serde(default = "default_use_fast_mode")]
        use_fast_mode: bool,
    },
}

/// The set of `type` tags the relay understands. Anything else is ignored
/// rather than rejected, so old servers tolerate newer clients.
const KNOWN_TYPES: [&str; 5] = [
    "AUTH",
    "SUBMIT_PRODUCT",
    "RESEARCH_BRAND",
    "RESEARCH_COMPETITORS",
    "GENERATE_PROMPTS",
];

/// Outcome of decoding a raw text frame from a client.
#[derive(Debug)]
pub enum Decoded {
    /// A well-formed message of a known type.
    Message(ClientMessage),
    /// Valid JSON with an unrecognized `type` tag; logged and ignored.
    UnknownType(String),
    /// Not valid JSON, no `type` field, or a known type with missing or
    /// invalid fields. The client gets an `ERROR` frame.
    Invalid,
}

/// Decode one inbound text frame.
///
/// The three-way split matters: unknown `type` values must be silently
/// ignored while malformed frames must produce an `ERROR` reply, so a plain
/// `serde_json::from_str::<ClientMessage>` is not enough.
pub fn decode_client_frame(text: &str) -> Decoded {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Decoded::Invalid,
    };

    let tag = match value.get("type").and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => return Decoded::Invalid,
    };

    if !KNOWN_TYPES.contains(&tag.as_str()) {
        return Decoded::UnknownType(tag);
    }

    match serde_json::from_value::<ClientMessage>(value) {
        Ok(msg) => Decoded::Message(msg),
        Err(_) => Decoded::Invalid,
    }
}

// ── Server → client messages ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    AuthSuccess {
        message: String,
    },

    /// Protocol-level error; the connection stays open.
    Error {
        message: String,
    },

    #[serde(rename_all = "camelCase")]
    ProductReceived {
        product_id: String,
        status: String,
    },
    #[serde(rename_all = "camelCase")]
    ProductReady {
        product_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    ProductError {
        product_id: String,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    BrandResearchStarted {
        request_id: String,
    },
    #[serde(rename_all = "camelCase")]
    BrandResearchComplete {
        request_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    BrandResearchError {
        request_id: String,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    CompetitorResearchStarted {
        request_id: String,
    },
    #[serde(rename_all = "camelCase")]
    CompetitorResearchComplete {
        request_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    CompetitorResearchError {
        request_id: String,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    PromptGenerationStarted {
        request_id: String,
    },
    #[serde(rename_all = "camelCase")]
    PromptGenerationComplete {
        request_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    PromptGenerationError {
        request_id: String,
        error: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
