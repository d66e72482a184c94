use async_trait::async_trait;
use boxoffice_core::{
    BookingError, BookingResult, CoreResult, LockingStrategy, Seat, SeatId, SeatRequest,
    SeatStore, SeatTransaction,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A way of claiming one seat under mutual exclusion.
#[async_trait]
pub trait BookingStrategy: Send + Sync {
    fn kind(&self) -> LockingStrategy;

    async fn book(&self, request: &SeatRequest, cancel: &CancellationToken) -> CoreResult<BookingResult>;
}

/// Persist an already-booked seat and commit. Shared tail of both strategies.
pub(crate) async fn persist_claim(
    store: &dyn SeatStore,
    mut tx: Box<dyn SeatTransaction>,
    seat: &Seat,
) -> CoreResult<BookingResult> {
    let written = match tx.save(seat).await {
        Ok(saved) => tx.commit().await.map(|_| saved),
        Err(e) => Err(e),
    };

    match written {
        Ok(saved) => BookingResult::from_seat(&saved),
        Err(BookingError::PersistenceConflict(seat_id)) => {
            if let Err(e) = tx.rollback().await {
                warn!("Rollback after version conflict on seat {} failed: {}", seat_id, e);
            }
            drop(tx);
            Err(resolve_conflict(store, seat_id).await)
        }
        Err(e) => Err(e),
    }
}

/// A stale write lost to a concurrent winner. Re-read outside the failed
/// transaction so the caller learns who holds the seat.
async fn resolve_conflict(store: &dyn SeatStore, seat_id: SeatId) -> BookingError {
    match store.find_seat(seat_id).await {
        Ok(Some(seat)) => match seat.ensure_available() {
            Err(occupied) => occupied,
            Ok(()) => BookingError::PersistenceConflict(seat_id),
        },
        Ok(None) => BookingError::SeatNotFound(seat_id),
        Err(e) => e,
    }
}
