use std::fmt;
use std::str::FromStr;

use boxoffice_shared::SeatUpdatedEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::seat::{Seat, SeatId};
use crate::{BookingError, CoreResult};

/// Which mutual-exclusion primitive arbitrates a booking attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockingStrategy {
    /// Exclusive row lock held by the store for one transaction.
    #[serde(alias = "DATABASE")]
    RowLock,
    /// Named, leased lock from the lock coordinator.
    #[default]
    #[serde(alias = "REDIS")]
    DistributedLock,
}

impl LockingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockingStrategy::RowLock => "row_lock",
            LockingStrategy::DistributedLock => "distributed_lock",
        }
    }
}

impl fmt::Display for LockingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockingStrategy {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ROW_LOCK" | "DATABASE" => Ok(LockingStrategy::RowLock),
            "DISTRIBUTED_LOCK" | "REDIS" => Ok(LockingStrategy::DistributedLock),
            other => Err(BookingError::InvalidCommand(format!(
                "unknown booking strategy: {}",
                other
            ))),
        }
    }
}

/// Raw booking request as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCommand {
    pub seat_id: Option<SeatId>,
    pub user_id: String,
}

/// A booking command that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatRequest {
    pub seat_id: SeatId,
    pub user_id: String,
}

impl BookingCommand {
    pub fn new(seat_id: i64, user_id: impl Into<String>) -> Self {
        Self {
            seat_id: Some(SeatId(seat_id)),
            user_id: user_id.into(),
        }
    }

    pub fn validate(&self) -> CoreResult<SeatRequest> {
        let seat_id = self
            .seat_id
            .ok_or_else(|| BookingError::InvalidCommand("seatId is required".to_string()))?;

        if self.user_id.trim().is_empty() {
            return Err(BookingError::InvalidCommand("userId is required".to_string()));
        }

        Ok(SeatRequest {
            seat_id,
            user_id: self.user_id.clone(),
        })
    }
}

/// Snapshot of a seat right after a booking committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResult {
    pub seat_id: SeatId,
    pub seat_number: String,
    pub booked_by: String,
    pub booked_at: DateTime<Utc>,
    pub booked: bool,
}

impl BookingResult {
    pub fn from_seat(seat: &Seat) -> CoreResult<Self> {
        let claim = seat.claim().ok_or_else(|| {
            BookingError::Store(format!("seat {} was persisted without a claim", seat.id))
        })?;

        Ok(Self {
            seat_id: seat.id,
            seat_number: seat.seat_number.clone(),
            booked_by: claim.booked_by.clone(),
            booked_at: claim.booked_at,
            booked: true,
        })
    }

    pub fn to_event(&self) -> SeatUpdatedEvent {
        SeatUpdatedEvent {
            seat_id: self.seat_id.0,
            seat_number: self.seat_number.clone(),
            booked_by: Some(self.booked_by.clone()),
            booked_at: Some(self.booked_at),
            booked: self.booked,
        }
    }
}

impl From<&Seat> for SeatUpdatedEvent {
    fn from(seat: &Seat) -> Self {
        SeatUpdatedEvent {
            seat_id: seat.id.0,
            seat_number: seat.seat_number.clone(),
            booked_by: seat.booked_by().map(str::to_string),
            booked_at: seat.booked_at(),
            booked: seat.is_booked(),
        }
    }
}
