use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Proof of a held distributed lock. The owner token is unique per
/// acquisition so a holder can never release somebody else's lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken {
    key: String,
    owner: String,
}

impl LeaseToken {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            owner: Uuid::new_v4().to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("lock wait was cancelled")]
    Cancelled,
    #[error("lock backend failure: {0}")]
    Backend(String),
}

/// Named, leased mutual exclusion shared across processes.
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Try to take `key` for at most `lease`, waiting up to `wait` for a
    /// current holder to go away. `Ok(None)` means the wait ran out.
    /// Fails with `LockError::Cancelled` as soon as `cancel` fires.
    async fn try_acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<LeaseToken>, LockError>;

    /// Release the lease if it is still owned by `token`.
    async fn release(&self, token: &LeaseToken) -> Result<(), LockError>;
}
