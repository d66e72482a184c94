use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use boxoffice_core::BookingError;
use chrono::Utc;
use serde_json::{json, Value};

#[derive(Debug)]
pub enum AppError {
    Booking(BookingError),
    BadRequest(String),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        Self::Booking(err)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Booking(err) => match err {
                BookingError::InvalidCommand(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_COMMAND", err.to_string())
                }
                BookingError::SeatNotFound(_) => {
                    (StatusCode::NOT_FOUND, "SEAT_NOT_FOUND", err.to_string())
                }
                BookingError::SeatOccupied { .. } | BookingError::PersistenceConflict(_) => {
                    (StatusCode::CONFLICT, "SEAT_OCCUPIED", err.to_string())
                }
                BookingError::LockAcquisitionTimeout { .. } => {
                    (StatusCode::CONFLICT, "LOCK_TIMEOUT", err.to_string())
                }
                BookingError::Interrupted { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "INTERRUPTED", err.to_string())
                }
                BookingError::Store(_) | BookingError::Lock(_) => {
                    tracing::error!("Booking backend failure: {}", err);
                    internal()
                }
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_COMMAND", msg.clone()),
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "Internal Server Error".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let mut body = json!({
            "timestamp": Utc::now(),
            "status": status.as_u16(),
            "error": code,
            "message": message,
        });

        // Losing bookers learn who holds the seat.
        if let AppError::Booking(BookingError::SeatOccupied { booked_by, booked_at, .. }) = &self {
            if let Value::Object(fields) = &mut body {
                fields.insert("bookedBy".to_string(), json!(booked_by));
                fields.insert("bookedAt".to_string(), json!(booked_at));
            }
        }

        (status, Json(body)).into_response()
    }
}
