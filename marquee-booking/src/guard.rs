use marquee_core::{BookingError, CoreResult, SeatLockKey, SeatLockService};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Tracks the seat locks taken by one booking attempt.
///
/// Callers release explicitly with [`SeatLockGuard::release_all`]. A guard
/// dropped while still holding keys (panic, cancelled future) hands the
/// releases to the current tokio runtime; TTL expiry covers the rest.
pub struct SeatLockGuard {
    locks: Arc<dyn SeatLockService>,
    held: Vec<(SeatLockKey, String)>,
}

impl SeatLockGuard {
    pub fn new(locks: Arc<dyn SeatLockService>) -> Self {
        Self {
            locks,
            held: Vec::new(),
        }
    }

    /// Single compare-and-set attempt. Only keys acquired here are ever
    /// released by this guard.
    pub async fn try_acquire(&mut self, key: SeatLockKey, owner: &str, ttl: Duration) -> CoreResult<bool> {
        let acquired = self
            .locks
            .try_acquire(&key, owner, ttl)
            .await
            .map_err(|e| BookingError::LockService(e.to_string()))?;
        if acquired {
            self.held.push((key, owner.to_string()));
        }
        Ok(acquired)
    }

    pub fn held(&self) -> Vec<SeatLockKey> {
        self.held.iter().map(|(key, _)| *key).collect()
    }

    pub async fn release_all(&mut self) {
        let keys = std::mem::take(&mut self.held);
        release_keys(self.locks.as_ref(), &keys).await;
    }
}

async fn release_keys(locks: &dyn SeatLockService, keys: &[(SeatLockKey, String)]) {
    for (key, owner) in keys {
        if let Err(e) = locks.release(key, owner).await {
            warn!("Failed to release {}: {}", key, e);
        }
    }
}

impl Drop for SeatLockGuard {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let keys = std::mem::take(&mut self.held);
        let locks = self.locks.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_keys(locks.as_ref(), &keys).await;
                });
            }
            Err(_) => warn!("No runtime to release {} seat locks; leaving them to expire", keys.len()),
        }
    }
}
