//! Providers that recently failed inside a running session.
//!
//! A provider marked here is left out of composition until its cooldown
//! elapses, so new sessions fall back to another topology meanwhile.

use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{info, warn};
use voxbridge_core::providers::ProviderId;

#[derive(Debug)]
pub struct DegradedProviders {
    cooldown: Duration,
    until: Mutex<HashMap<ProviderId, Instant>>,
}

impl DegradedProviders {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            until: Mutex::new(HashMap::new()),
        }
    }

    pub fn mark(&self, provider: ProviderId) {
        if self.cooldown.is_zero() {
            return;
        }
        let until = Instant::now() + self.cooldown;
        self.until.lock().insert(provider, until);
        warn!(%provider, cooldown = ?self.cooldown, "Provider excluded from new sessions");
    }

    pub fn active(&self) -> BTreeSet<ProviderId> {
        self.active_at(Instant::now())
    }

    /// Providers still cooling down at `now`; expired entries are dropped.
    pub fn active_at(&self, now: Instant) -> BTreeSet<ProviderId> {
        let mut until = self.until.lock();
        until.retain(|provider, deadline| {
            let keep = *deadline > now;
            if !keep {
                info!(%provider, "Provider cooldown elapsed");
            }
            keep
        });
        until.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_marked_provider_expires_after_cooldown() {
        let degraded = DegradedProviders::new(Duration::from_secs(300));
        degraded.mark(ProviderId::Cartesia);
        assert!(degraded.active().contains(&ProviderId::Cartesia));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(degraded.active().contains(&ProviderId::Cartesia));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(degraded.active().is_empty());
    }

    #[test]
    fn test_zero_cooldown_never_excludes() {
        let degraded = DegradedProviders::new(Duration::ZERO);
        degraded.mark(ProviderId::Cartesia);
        assert!(degraded.active_at(Instant::now()).is_empty());
    }
}
