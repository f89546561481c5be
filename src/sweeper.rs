//! Periodic reclamation of pending jobs that never received a callback.
//!
//! Purely a memory-leak guard. Sweeping is silent: the client is not told
//! (the browser's polling fallback covers genuinely lost results) and the
//! workflow engine is not told (its later callback will simply find no
//! entry, which the callback path already tolerates).

use tokio::task::JoinHandle;
use tracing::info;

use crate::server::SharedState;

/// Spawn the recurring sweep task. Runs for the life of the process.
pub fn spawn(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.sweep_interval);
        // Skip the immediate first tick; there is nothing to sweep yet.
        interval.tick().await;

        loop {
            interval.tick().await;
            let removed = state.jobs.sweep_expired(state.config.job_ttl).await;
            if removed > 0 {
                info!(removed, "swept expired pending jobs");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::jobs::ProductJob;
    use crate::server::AppState;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_stale_jobs_on_tick() {
        let config = RelayConfig {
            sweep_interval: Duration::from_secs(60),
            // Zero TTL: anything inserted before the tick counts as stale.
            job_ttl: Duration::ZERO,
            ..RelayConfig::default()
        };
        let state = Arc::new(AppState::new(config));
        state
            .jobs
            .products
            .put("p1", "u1", ProductJob { product_name: "Widget".to_string() })
            .await;

        let handle = spawn(state.clone());

        // Let the task start and consume its immediate first tick.
        tokio::task::yield_now().await;
        assert_eq!(state.jobs.counts().await.products, 1);

        // Advance past the first real tick and let the sweep run.
        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(state.jobs.counts().await.products, 0);
        handle.abort();
    }
}
