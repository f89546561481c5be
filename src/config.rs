//! Runtime configuration for the relay.
//!
//! Everything is read from the environment (a `.env` file is honored via
//! `dotenvy` in `main`), with the same variable names the original
//! deployment used where they existed. The sweep interval and job TTL are
//! fixed constants; they are part of the config struct so tests can shrink
//! them, but there is deliberately no environment surface for them.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::protocol::JobKind;

/// How often the expiry sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How long a pending job may wait for a callback before being swept.
pub const JOB_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Port the HTTP + WebSocket listener binds to.
    pub port: u16,
    /// Base URL the workflow engine uses to reach this relay's callback
    /// routes. Defaults to `http://localhost:{port}`.
    pub public_base_url: String,
    pub product_webhook_url: String,
    pub brand_research_webhook_url: String,
    pub competitor_research_webhook_url: String,
    pub prompt_generation_webhook_url: String,
    pub sweep_interval: Duration,
    pub job_ttl: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            public_base_url: "http://localhost:3001".to_string(),
            product_webhook_url: "http://localhost:5678/webhook/product-lookup".to_string(),
            brand_research_webhook_url: "http://localhost:5678/webhook/brand-research"
                .to_string(),
            competitor_research_webhook_url:
                "http://localhost:5678/webhook/competitor-research".to_string(),
            prompt_generation_webhook_url: "http://localhost:5678/webhook/prompt-generation"
                .to_string(),
            sweep_interval: SWEEP_INTERVAL,
            job_ttl: JOB_TTL,
        }
    }
}

impl RelayConfig {
    /// Build the config from environment variables, falling back to the
    /// defaults above for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("WS_SERVER_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("Invalid WS_SERVER_PORT value: {port}"))?;
            config.public_base_url = format!("http://localhost:{}", config.port);
        }
        if let Ok(url) = std::env::var("RELAY_PUBLIC_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = std::env::var("N8N_PRODUCT_WEBHOOK_URL") {
            config.product_webhook_url = url;
        }
        if let Ok(url) = std::env::var("N8N_BRAND_RESEARCH_WEBHOOK_URL") {
            config.brand_research_webhook_url = url;
        }
        if let Ok(url) = std::env::var("N8N_COMPETITOR_RESEARCH_WEBHOOK_URL") {
            config.competitor_research_webhook_url = url;
        }
        if let Ok(url) = std::env::var("N8N_PROMPT_GENERATION_WEBHOOK_URL") {
            config.prompt_generation_webhook_url = url;
        }

        Ok(config)
    }

    /// The workflow-engine webhook for a job kind.
    pub fn webhook_url(&self, kind: JobKind) -> &str {
        match kind {
            JobKind::Product => &self.product_webhook_url,
            JobKind::BrandResearch => &self.brand_research_webhook_url,
            JobKind::CompetitorResearch => &self.competitor_research_webhook_url,
            JobKind::PromptGeneration => &self.prompt_generation_webhook_url,
        }
    }

    /// The callback URL the workflow engine should POST results to for a
    /// job kind. Included in every dispatch body.
    pub fn callback_url(&self, kind: JobKind) -> String {
        format!("{}/api/callbacks/{}", self.public_base_url, kind.name())
    }
}
