use std::sync::Arc;

use boxoffice_booking::BookingOrchestrator;
use boxoffice_core::SeatStore;
use boxoffice_shared::SeatUpdatedEvent;
use prometheus::Registry;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub seats: Arc<dyn SeatStore>,
    pub seat_tx: broadcast::Sender<SeatUpdatedEvent>,
    pub registry: Registry,
    /// Cancelled on shutdown; in-flight lock waits observe child tokens.
    pub shutdown: CancellationToken,
}
