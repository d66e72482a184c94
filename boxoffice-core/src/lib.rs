pub mod booking;
pub mod lock;
pub mod repository;
pub mod seat;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use booking::{BookingCommand, BookingResult, LockingStrategy, SeatRequest};
pub use lock::{LeaseToken, LockCoordinator, LockError};
pub use repository::{SeatEventSink, SeatStore, SeatTransaction};
pub use seat::{Seat, SeatClaim, SeatId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid booking command: {0}")]
    InvalidCommand(String),
    #[error("Seat not found: {0}")]
    SeatNotFound(SeatId),
    #[error("Seat {seat_id} was already claimed by {booked_by} at {booked_at}")]
    SeatOccupied {
        seat_id: SeatId,
        booked_by: String,
        booked_at: DateTime<Utc>,
    },
    #[error("Distributed lock acquisition timed out after {}ms for seat {seat_id}", .wait.as_millis())]
    LockAcquisitionTimeout { seat_id: SeatId, wait: Duration },
    #[error("Interrupted while acquiring lock for seat: {seat_id}")]
    Interrupted { seat_id: SeatId },
    #[error("Concurrent modification detected for seat {0}")]
    PersistenceConflict(SeatId),
    #[error("Seat store failure: {0}")]
    Store(String),
    #[error("Lock coordinator failure: {0}")]
    Lock(String),
}

impl BookingError {
    /// Stable machine-readable code, used for metric labels and API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidCommand(_) => "INVALID_COMMAND",
            BookingError::SeatNotFound(_) => "SEAT_NOT_FOUND",
            BookingError::SeatOccupied { .. } => "SEAT_OCCUPIED",
            BookingError::LockAcquisitionTimeout { .. } => "LOCK_TIMEOUT",
            BookingError::Interrupted { .. } => "INTERRUPTED",
            BookingError::PersistenceConflict(_) => "PERSISTENCE_CONFLICT",
            BookingError::Store(_) => "STORE_FAILURE",
            BookingError::Lock(_) => "LOCK_FAILURE",
        }
    }

    /// True for outcomes where another caller already owns the seat.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            BookingError::SeatOccupied { .. } | BookingError::PersistenceConflict(_)
        )
    }
}

pub type CoreResult<T> = Result<T, BookingError>;
