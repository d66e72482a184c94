use async_trait::async_trait;
use boxoffice_core::SeatEventSink;
use boxoffice_shared::SeatUpdatedEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{info, error};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
}

impl EventProducer {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer, topic: topic.to_string() })
    }

    pub async fn publish_raw(&self, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(&self.topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!("Sent message to {}/{}: partition {} offset {}", self.topic, key, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", self.topic, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SeatEventSink for EventProducer {
    async fn publish(&self, event: &SeatUpdatedEvent) {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode seat update for seat {}: {}", event.seat_id, e);
                return;
            }
        };

        // Failures are already logged; the booking itself has committed.
        let _ = self.publish_raw(&event.key(), &payload).await;
    }
}
