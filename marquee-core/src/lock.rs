use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::{SeatId, ShowtimeId};

/// How long a seat lock survives if its holder never releases it.
pub const SEAT_LOCK_TTL: Duration = Duration::from_secs(5 * 60);

pub type LockError = Box<dyn std::error::Error + Send + Sync>;

/// Identity of a distributed seat lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeatLockKey {
    pub showtime_id: ShowtimeId,
    pub seat_id: SeatId,
}

impl SeatLockKey {
    pub fn new(showtime_id: ShowtimeId, seat_id: SeatId) -> Self {
        Self { showtime_id, seat_id }
    }
}

impl fmt::Display for SeatLockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seat_lock:{}:{}", self.showtime_id, self.seat_id)
    }
}

/// Keyed, TTL-bounded mutual exclusion held outside the process.
///
/// Acquisition is a single compare-and-set attempt: if a live entry exists
/// for the key, `try_acquire` returns `Ok(false)` immediately instead of
/// waiting for it.
#[async_trait]
pub trait SeatLockService: Send + Sync {
    async fn try_acquire(
        &self,
        key: &SeatLockKey,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, LockError>;

    /// Deletes the entry only while `owner` still holds it. Releasing a
    /// missing, expired or re-acquired lock is not an error.
    async fn release(&self, key: &SeatLockKey, owner: &str) -> Result<(), LockError>;

    async fn peek(&self, key: &SeatLockKey) -> Result<Option<String>, LockError>;
}
