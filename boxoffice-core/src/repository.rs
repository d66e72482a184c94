use async_trait::async_trait;
use boxoffice_shared::SeatUpdatedEvent;

use crate::seat::{Seat, SeatId};
use crate::CoreResult;

/// One unit of work against the seat store.
///
/// Dropping a transaction without `commit` rolls it back and releases any
/// row locks it holds.
#[async_trait]
pub trait SeatTransaction: Send {
    /// Read a seat and hold its exclusive row lock until the transaction ends.
    async fn fetch_for_update(&mut self, id: SeatId) -> CoreResult<Seat>;

    /// Plain read, no row lock.
    async fn fetch(&mut self, id: SeatId) -> CoreResult<Seat>;

    /// Conditional write: succeeds only if `seat.version` still matches the
    /// stored version. Returns the seat with its bumped version, or
    /// `PersistenceConflict` if someone else wrote first.
    async fn save(&mut self, seat: &Seat) -> CoreResult<Seat>;

    async fn commit(&mut self) -> CoreResult<()>;

    /// Idempotent: a no-op on a transaction that already ended.
    async fn rollback(&mut self) -> CoreResult<()>;
}

/// Repository trait for seat inventory
#[async_trait]
pub trait SeatStore: Send + Sync {
    async fn begin(&self) -> CoreResult<Box<dyn SeatTransaction>>;

    async fn find_seat(&self, id: SeatId) -> CoreResult<Option<Seat>>;

    async fn list_seats(&self) -> CoreResult<Vec<Seat>>;

    /// Insert available seats for labels not present yet. Returns how many were created.
    async fn seed_seats(&self, labels: &[String]) -> CoreResult<usize>;
}

/// Receives committed seat state. Delivery is fire-and-forget: sinks log
/// their own failures instead of reporting them to the booking caller.
#[async_trait]
pub trait SeatEventSink: Send + Sync {
    async fn publish(&self, event: &SeatUpdatedEvent);
}
