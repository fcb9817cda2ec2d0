use async_trait::async_trait;
use marquee_core::lock::{LockError, SeatLockKey, SeatLockService};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

/// Seat locks as Redis string keys (`seat_lock:{showtime}:{seat}`) whose
/// value is the holder and whose expiry is the lock TTL.
#[derive(Clone)]
pub struct RedisSeatLocks {
    client: redis::Client,
}

impl RedisSeatLocks {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }
}

const RELEASE_IF_OWNER: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

fn ttl_seconds(ttl: Duration) -> u64 {
    // EX rejects 0
    ttl.as_secs().max(1)
}

#[async_trait]
impl SeatLockService for RedisSeatLocks {
    async fn try_acquire(&self, key: &SeatLockKey, owner: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET NX: Only set if key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(key.to_string())
            .arg(owner)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;

        debug!("Lock {} for {}: {}", key, owner, if result.is_some() { "acquired" } else { "busy" });
        Ok(result.is_some())
    }

    async fn release(&self, key: &SeatLockKey, owner: &str) -> Result<(), LockError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // Compare-and-delete: a lock that expired and was taken by someone
        // else stays with them.
        let script = redis::Script::new(RELEASE_IF_OWNER);
        let deleted: i64 = script.key(key.to_string()).arg(owner).invoke_async(&mut conn).await?;
        if deleted == 0 {
            debug!("Lock {} no longer held by {}; nothing released", key, owner);
        }
        Ok(())
    }

    async fn peek(&self, key: &SeatLockKey) -> Result<Option<String>, LockError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let holder: Option<String> = conn.get(key.to_string()).await?;
        Ok(holder)
    }
}
