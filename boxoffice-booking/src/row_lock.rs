use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use boxoffice_core::{BookingResult, CoreResult, LockingStrategy, SeatRequest, SeatStore};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::strategy::{persist_claim, BookingStrategy};

/// Lets the store arbitrate: the row lock taken by `fetch_for_update` lives
/// exactly as long as the transaction, so commit is the release.
pub struct RowLockStrategy {
    store: Arc<dyn SeatStore>,
}

impl RowLockStrategy {
    pub fn new(store: Arc<dyn SeatStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BookingStrategy for RowLockStrategy {
    fn kind(&self) -> LockingStrategy {
        LockingStrategy::RowLock
    }

    async fn book(&self, request: &SeatRequest, _cancel: &CancellationToken) -> CoreResult<BookingResult> {
        let mut tx = self.store.begin().await?;

        let lock_start = Instant::now();
        let mut seat = tx.fetch_for_update(request.seat_id).await?;
        debug!(
            "Seat {} locked via row lock for user {} in {}ms",
            request.seat_id,
            request.user_id,
            lock_start.elapsed().as_millis()
        );

        // Occupied: the transaction is dropped here, which rolls back and unlocks.
        seat.book(&request.user_id, Utc::now())?;

        persist_claim(self.store.as_ref(), tx, &seat).await
    }
}
