// SPDX-License-Identifier: MIT OR Apache-2.0
//! Periodic eviction of stale chat sessions (§4.5, §8).
//!
//! The reaper is a plain `tokio::spawn`'d loop, not a cron-style scheduler —
//! there is exactly one registry per process and exactly one reaper task for
//! it. Intentionally never started by test code; tests call
//! [`fleet_core::ChatSession::is_evictable`] and
//! [`crate::registry::SessionRegistry::evict_expired`] directly with a
//! controlled `now`.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::SessionRegistry;

/// How often the reaper sweeps the registry for stale sessions.
pub const REAPER_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Spawn a background task that calls
/// [`SessionRegistry::evict_expired`] every [`REAPER_INTERVAL`] until the
/// returned handle is dropped or aborted.
///
/// Not `#[cfg(test)]`-gated itself — callers (the `fleet-server` binary)
/// are responsible for never spawning it in a test harness, per §8's "never
/// runs during tests".
pub fn spawn(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAPER_INTERVAL);
        // The first tick fires immediately; skip it so the reaper's first
        // real sweep happens one interval after startup.
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = registry.evict_expired(chrono::Utc::now());
            if evicted > 0 {
                tracing::debug!(evicted, "reaped stale chat sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::UserId;

    #[tokio::test(start_paused = true)]
    async fn reaper_evicts_after_interval_elapses() {
        let registry = Arc::new(SessionRegistry::new());
        // `evict_expired` reads the real wall clock, not tokio's paused
        // virtual clock, so make the session already past its TTL rather
        // than relying on advancing time to make it stale.
        let stale = chrono::Utc::now() - chrono::Duration::hours(1);
        registry.get_or_create(UserId::from("u1"), Some("stale".into()), stale);

        let handle = spawn(registry.clone());
        tokio::time::advance(REAPER_INTERVAL * 2 + Duration::from_secs(1)).await;
        // Yield so the spawned task can observe the advanced clock.
        tokio::task::yield_now().await;

        assert_eq!(registry.len(), 0);
        handle.abort();
    }
}
