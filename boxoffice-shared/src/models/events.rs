use chrono::{DateTime, Utc};

/// Authoritative seat state pushed to subscribers after a booking commits.
///
/// Field names follow the public wire format used by the HTTP layer and the
/// `seats.updated` topic, so UI clients can apply it without a lookup.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeatUpdatedEvent {
    pub seat_id: i64,
    pub seat_number: String,
    pub booked_by: Option<String>,
    pub booked_at: Option<DateTime<Utc>>,
    pub booked: bool,
}

impl SeatUpdatedEvent {
    /// Partition key for the event stream: all updates of a seat stay ordered.
    pub fn key(&self) -> String {
        self.seat_id.to_string()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
