use std::time::Duration;

use async_trait::async_trait;
use boxoffice_core::{LeaseToken, LockCoordinator, LockError};
use redis::RedisResult;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lock_wait::{acquire_with_retry, LeaseBackend};

// Delete the key only while it still carries our owner token, so a lease that
// expired and was re-acquired by someone else is left alone.
const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    retry_interval: Duration,
}

impl RedisClient {
    pub fn new(connection_string: &str, retry_interval: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client, retry_interval })
    }

    /// SET NX PX: only set if the key does not exist, with a millisecond expiry.
    pub async fn set_lock_nx(&self, key: &str, owner: &str, lease: Duration) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1))
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    /// Returns true if the key was still ours and got deleted.
    pub async fn release_lock(&self, key: &str, owner: &str) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(RELEASE_SCRIPT);
        let deleted: i64 = script.key(key).arg(owner).invoke_async(&mut conn).await?;
        Ok(deleted == 1)
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl LeaseBackend for RedisClient {
    async fn try_claim(&self, token: &LeaseToken, lease: Duration) -> Result<bool, LockError> {
        self.set_lock_nx(token.key(), token.owner(), lease)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))
    }
}

#[async_trait]
impl LockCoordinator for RedisClient {
    async fn try_acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<LeaseToken>, LockError> {
        acquire_with_retry(self, key, wait, lease, self.retry_interval, cancel).await
    }

    async fn release(&self, token: &LeaseToken) -> Result<(), LockError> {
        let released = self
            .release_lock(token.key(), token.owner())
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        if released {
            debug!("Released lock {}", token.key());
        } else {
            warn!("Lock {} expired before release; lease was too short for the critical section", token.key());
        }
        Ok(())
    }
}
