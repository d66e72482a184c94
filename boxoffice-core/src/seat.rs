use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BookingError, CoreResult};

/// Store-assigned seat identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(pub i64);

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SeatId {
    fn from(id: i64) -> Self {
        SeatId(id)
    }
}

/// Who claimed a seat and when. Both halves exist together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatClaim {
    pub booked_by: String,
    pub booked_at: DateTime<Utc>,
}

/// A bookable seat as persisted by the seat store.
///
/// `version` is bumped by the store on every successful conditional save and
/// is what the store compares against to reject stale writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub seat_number: String,
    claim: Option<SeatClaim>,
    pub version: i64,
}

impl Seat {
    pub fn new(id: SeatId, seat_number: impl Into<String>) -> Self {
        Self {
            id,
            seat_number: seat_number.into(),
            claim: None,
            version: 0,
        }
    }

    /// Rebuild a seat from its storage columns, rejecting rows where only one
    /// of `booked_by` / `booked_at` is set.
    pub fn from_parts(
        id: SeatId,
        seat_number: String,
        booked_by: Option<String>,
        booked_at: Option<DateTime<Utc>>,
        version: i64,
    ) -> CoreResult<Self> {
        let claim = match (booked_by, booked_at) {
            (Some(booked_by), Some(booked_at)) => Some(SeatClaim {
                booked_by,
                booked_at,
            }),
            (None, None) => None,
            _ => {
                return Err(BookingError::Store(format!(
                    "seat {} has a partial booking record",
                    id
                )))
            }
        };

        Ok(Self {
            id,
            seat_number,
            claim,
            version,
        })
    }

    pub fn claim(&self) -> Option<&SeatClaim> {
        self.claim.as_ref()
    }

    pub fn booked_by(&self) -> Option<&str> {
        self.claim.as_ref().map(|c| c.booked_by.as_str())
    }

    pub fn booked_at(&self) -> Option<DateTime<Utc>> {
        self.claim.as_ref().map(|c| c.booked_at)
    }

    pub fn is_booked(&self) -> bool {
        self.claim.is_some()
    }

    /// Fails with `SeatOccupied` carrying the current claim if the seat is taken.
    pub fn ensure_available(&self) -> CoreResult<()> {
        match &self.claim {
            Some(claim) => Err(BookingError::SeatOccupied {
                seat_id: self.id,
                booked_by: claim.booked_by.clone(),
                booked_at: claim.booked_at,
            }),
            None => Ok(()),
        }
    }

    /// Transition: Available → Booked. Booked is terminal.
    pub fn book(&mut self, user_id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_available()?;
        self.claim = Some(SeatClaim {
            booked_by: user_id.to_string(),
            booked_at: at,
        });
        Ok(())
    }
}
