use std::time::Duration;

use async_trait::async_trait;
use boxoffice_core::{LeaseToken, LockError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A backend that can make a single non-blocking attempt at a lease.
#[async_trait]
pub(crate) trait LeaseBackend: Send + Sync {
    async fn try_claim(&self, token: &LeaseToken, lease: Duration) -> Result<bool, LockError>;
}

// Stand-in for "never" when a duration runs past what `Instant` can hold.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, clamped instead of overflowing on huge durations.
pub(crate) fn deadline_after(now: Instant, after: Duration) -> Instant {
    now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Poll `backend` until the lease is granted, `wait` runs out, or `cancel` fires.
///
/// Always makes at least one attempt, so a zero wait means "try once".
pub(crate) async fn acquire_with_retry<B>(
    backend: &B,
    key: &str,
    wait: Duration,
    lease: Duration,
    retry: Duration,
    cancel: &CancellationToken,
) -> Result<Option<LeaseToken>, LockError>
where
    B: LeaseBackend + ?Sized,
{
    let token = LeaseToken::new(key);
    let deadline = deadline_after(Instant::now(), wait);

    loop {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        if backend.try_claim(&token, lease).await? {
            return Ok(Some(token));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }

        let pause = retry.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(LockError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
