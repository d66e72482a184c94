use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use boxoffice_api::{app, AppState};
use boxoffice_booking::{
    BookingMetrics, BookingOrchestrator, BroadcastSink, DistributedLockStrategy, FanoutSink,
    LockSettings, RowLockStrategy,
};
use boxoffice_core::{SeatEventSink, SeatStore};
use boxoffice_store::app_config::Config;
use boxoffice_store::{DbClient, RedisClient};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "boxoffice_api=debug,boxoffice_booking=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting boxoffice API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let seats: Arc<dyn SeatStore> = Arc::new(db.seat_repository());

    if seats.list_seats().await?.is_empty() {
        seats.seed_seats(&config.inventory.labels()).await?;
    }

    // Redis
    let redis = RedisClient::new(&config.redis.url, config.booking.lock_retry())
        .context("Invalid Redis URL")?;
    if let Err(e) = redis.ping().await {
        // Bookings using the distributed lock will fail until Redis is back.
        tracing::warn!("Redis is not reachable yet: {}", e);
    }

    // Seat update fan-out: SSE subscribers, plus Kafka when configured
    let (seat_tx, _) = tokio::sync::broadcast::channel(256);
    let mut sinks: Vec<Arc<dyn SeatEventSink>> = vec![Arc::new(BroadcastSink::new(seat_tx.clone()))];
    if let Some(kafka) = kafka_sink(&config)? {
        sinks.push(kafka);
    }

    let registry = Registry::new();
    let metrics = BookingMetrics::new(&registry).context("Failed to register booking metrics")?;

    let orchestrator = BookingOrchestrator::new(
        RowLockStrategy::new(seats.clone()),
        DistributedLockStrategy::new(
            seats.clone(),
            Arc::new(redis),
            LockSettings {
                wait: config.booking.lock_wait(),
                lease: config.booking.lock_lease(),
            },
        ),
        Arc::new(FanoutSink::new(sinks)),
        metrics,
    )
    .with_default_strategy(config.booking.default_strategy);

    let shutdown = CancellationToken::new();
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        seats,
        seat_tx,
        registry,
        shutdown: shutdown.clone(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
    shutdown.cancel();
}

#[cfg(feature = "kafka")]
fn kafka_sink(config: &Config) -> anyhow::Result<Option<Arc<dyn SeatEventSink>>> {
    let Some(kafka) = &config.kafka else {
        return Ok(None);
    };
    let producer = boxoffice_store::EventProducer::new(&kafka.brokers, &kafka.topic)
        .context("Failed to create Kafka producer")?;
    tracing::info!("Publishing seat updates to Kafka topic {}", kafka.topic);
    Ok(Some(Arc::new(producer)))
}

#[cfg(not(feature = "kafka"))]
fn kafka_sink(config: &Config) -> anyhow::Result<Option<Arc<dyn SeatEventSink>>> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka is configured but this build lacks the `kafka` feature; skipping");
    }
    Ok(None)
}
