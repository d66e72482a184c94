use std::sync::Arc;

use async_trait::async_trait;
use boxoffice_core::SeatEventSink;
use boxoffice_shared::SeatUpdatedEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Pushes seat updates to in-process subscribers (the SSE stream).
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<SeatUpdatedEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<SeatUpdatedEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl SeatEventSink for BroadcastSink {
    async fn publish(&self, event: &SeatUpdatedEvent) {
        // An error only means nobody is listening right now.
        if self.tx.send(event.clone()).is_err() {
            debug!("No subscribers for seat {} update", event.seat_id);
        }
    }
}

/// Forwards each update to every inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SeatEventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn SeatEventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl SeatEventSink for FanoutSink {
    async fn publish(&self, event: &SeatUpdatedEvent) {
        for sink in &self.sinks {
            sink.publish(event).await;
        }
    }
}
