use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use boxoffice_core::SeatStore;
use boxoffice_shared::SeatUpdatedEvent;
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/seats", get(list_seats))
        .route("/api/v1/seats/stream", get(seat_stream))
}

async fn list_seats(State(state): State<AppState>) -> Result<Json<Vec<SeatUpdatedEvent>>, AppError> {
    let seats = state.seats.list_seats().await?;
    Ok(Json(seats.iter().map(SeatUpdatedEvent::from).collect()))
}

async fn seat_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.seat_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(update) => match Event::default().event("seat_updated").json_data(&update) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    warn!("Failed to encode seat {} update: {}", update.seat_id, e);
                    None
                }
            },
            // Lagged subscriber: skip what was missed, keep streaming.
            Err(e) => {
                warn!("Seat stream subscriber lagged: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
