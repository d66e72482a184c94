use std::sync::Arc;

use boxoffice_core::{LeaseToken, LockCoordinator};
use tracing::warn;

/// Scoped ownership of a distributed lock.
///
/// `release` is the normal exit. If the guard is dropped while still holding
/// the lease (the owning future was cancelled, or unwound), the release is
/// spawned onto the current runtime instead; the lease expiry only covers
/// the case where no runtime is left to run it.
pub struct LeaseGuard {
    coordinator: Arc<dyn LockCoordinator>,
    token: Option<LeaseToken>,
}

impl LeaseGuard {
    pub fn new(coordinator: Arc<dyn LockCoordinator>, token: LeaseToken) -> Self {
        Self {
            coordinator,
            token: Some(token),
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.token.as_ref().map(LeaseToken::key)
    }

    pub async fn release(mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.coordinator.release(&token).await {
                warn!("Failed to release lock {}: {}", token.key(), e);
            }
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let coordinator = self.coordinator.clone();
                handle.spawn(async move {
                    if let Err(e) = coordinator.release(&token).await {
                        warn!("Failed to release abandoned lock {}: {}", token.key(), e);
                    }
                });
            }
            Err(_) => {
                warn!("No runtime to release lock {}; it will expire with its lease", token.key());
            }
        }
    }
}
