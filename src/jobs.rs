//! In-memory tracking of jobs awaiting a workflow-engine callback.
//!
//! One store per job kind, each an independent map from a caller-supplied
//! job id to the job's metadata. The owning user id recorded here is the
//! sole routing key for the eventual callback; the originating connection is
//! deliberately not stored, because the job may outlive it.
//!
//! Nothing is durable. A process restart loses all tracking, which is
//! acceptable because the browser side polls the authoritative datastore
//! while a job is outstanding.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::protocol::JobKind;

/// Metadata for one in-flight job.
#[derive(Debug, Clone)]
pub struct PendingJob<M> {
    pub user_id: String,
    pub meta: M,
    created_at: Instant,
}

impl<M> PendingJob<M> {
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// One partition of the pending-job map.
#[derive(Debug)]
pub struct JobStore<M> {
    kind_name: &'static str,
    inner: RwLock<HashMap<String, PendingJob<M>>>,
}

impl<M> JobStore<M> {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind_name: kind.name(),
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a job. Job ids are caller-supplied and treated as opaque; a
    /// duplicate id overwrites the previous entry (last write wins) and is
    /// logged, since losing track of the earlier job is surprising but the
    /// callback for either will still route by user id.
    pub async fn put(&self, job_id: &str, user_id: &str, meta: M) {
        let mut inner = self.inner.write().await;
        let previous = inner.insert(
            job_id.to_string(),
            PendingJob {
                user_id: user_id.to_string(),
                meta,
                created_at: Instant::now(),
            },
        );
        if previous.is_some() {
            warn!(
                kind = self.kind_name,
                job_id, "duplicate job id, overwriting pending entry"
            );
        }
    }

    /// Remove and return a job, or `None` if the id is unknown. Unknown ids
    /// are expected: the callback may arrive after a sweep or a restart.
    pub async fn take(&self, job_id: &str) -> Option<PendingJob<M>> {
        self.inner.write().await.remove(job_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn contains(&self, job_id: &str) -> bool {
        self.inner.read().await.contains_key(job_id)
    }

    /// Drop every entry older than `max_age`. Returns how many were
    /// removed. Sweeping is silent: no client or engine is notified.
    pub async fn sweep_expired(&self, max_age: Duration) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|job_id, job| {
            let keep = job.age() <= max_age;
            if !keep {
                warn!(
                    kind = self.kind_name,
                    job_id = %job_id,
                    "sweeping stale pending job with no callback"
                );
            }
            keep
        });
        before - inner.len()
    }
}

// ── Per-kind metadata ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ProductJob {
    pub product_name: String,
}

#[derive(Debug, Clone)]
pub struct BrandResearchJob {
    pub website_url: String,
    pub brand_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompetitorResearchJob {
    pub brand_name: String,
    pub brand_description: String,
    pub industry: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PromptGenerationJob {
    pub brand_id: String,
    pub brand_name: String,
    pub brand_description: String,
    pub topics: Vec<String>,
    pub competitors: Vec<String>,
    pub organization_id: String,
    pub num_topics: u32,
    pub prompts_per_topic: u32,
    pub use_fast_mode: bool,
}

/// Current partition sizes, as reported by the health endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PendingCounts {
    pub products: usize,
    pub brand_research: usize,
    pub competitor_research: usize,
    pub prompt_generation: usize,
}

/// All four partitions together.
#[derive(Debug)]
pub struct PendingJobs {
    pub products: JobStore<ProductJob>,
    pub brand_research: JobStore<BrandResearchJob>,
    pub competitor_research: JobStore<CompetitorResearchJob>,
    pub prompt_generation: JobStore<PromptGenerationJob>,
}

impl Default for PendingJobs {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingJobs {
    pub fn new() -> Self {
        Self {
            products: JobStore::new(JobKind::Product),
            brand_research: JobStore::new(JobKind::BrandResearch),
            competitor_research: JobStore::new(JobKind::CompetitorResearch),
            prompt_generation: JobStore::new(JobKind::PromptGeneration),
        }
    }

    /// Remove a job id from the partition for `kind`, if present. Used by
    /// the dispatch failure path, which only knows the kind and id.
    pub async fn remove(&self, kind: JobKind, job_id: &str) -> bool {
        match kind {
            JobKind::Product => self.products.take(job_id).await.is_some(),
            JobKind::BrandResearch => self.brand_research.take(job_id).await.is_some(),
            JobKind::CompetitorResearch => {
                self.competitor_research.take(job_id).await.is_some()
            }
            JobKind::PromptGeneration => self.prompt_generation.take(job_id).await.is_some(),
        }
    }

    /// Sweep every partition; returns the total number of removed entries.
    pub async fn sweep_expired(&self, max_age: Duration) -> usize {
        self.products.sweep_expired(max_age).await
            + self.brand_research.sweep_expired(max_age).await
            + self.competitor_research.sweep_expired(max_age).await
            + self.prompt_generation.sweep_expired(max_age).await
    }

    pub async fn counts(&self) -> PendingCounts {
        PendingCounts {
            products: self.products.len().await,
            brand_research: self.brand_research.len().await,
            competitor_research: self.competitor_research.len().await,
            prompt_generation: self.prompt_generation.len().await,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
