use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use boxoffice_core::{BookingCommand, BookingResult, LockingStrategy, SeatId};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSeatRequest {
    pub seat_id: Option<i64>,
    #[serde(default)]
    pub user_id: String,
    pub strategy: Option<LockingStrategy>,
}

impl BookSeatRequest {
    fn command(&self) -> BookingCommand {
        BookingCommand {
            seat_id: self.seat_id.map(SeatId),
            user_id: self.user_id.clone(),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/bookings", post(book_seat))
}

async fn book_seat(
    State(state): State<AppState>,
    payload: Result<Json<BookSeatRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResult>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let cancel = state.shutdown.child_token();
    let result = state
        .orchestrator
        .book_seat_with_cancel(&req.command(), req.strategy, &cancel)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}
