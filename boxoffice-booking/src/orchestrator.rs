use std::sync::Arc;
use std::time::Instant;

use boxoffice_core::{
    BookingCommand, BookingError, BookingResult, CoreResult, LockingStrategy, SeatEventSink,
    SeatRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::distributed_lock::DistributedLockStrategy;
use crate::metrics::BookingMetrics;
use crate::row_lock::RowLockStrategy;
use crate::strategy::BookingStrategy;

/// Entry point for seat bookings: validates the command, picks a locking
/// strategy, records the outcome and announces successful claims.
pub struct BookingOrchestrator {
    row_lock: Arc<RowLockStrategy>,
    distributed: Arc<DistributedLockStrategy>,
    sink: Arc<dyn SeatEventSink>,
    metrics: BookingMetrics,
    default_strategy: LockingStrategy,
}

impl BookingOrchestrator {
    pub fn new(
        row_lock: RowLockStrategy,
        distributed: DistributedLockStrategy,
        sink: Arc<dyn SeatEventSink>,
        metrics: BookingMetrics,
    ) -> Self {
        Self {
            row_lock: Arc::new(row_lock),
            distributed: Arc::new(distributed),
            sink,
            metrics,
            default_strategy: LockingStrategy::default(),
        }
    }

    pub fn with_default_strategy(mut self, strategy: LockingStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn default_strategy(&self) -> LockingStrategy {
        self.default_strategy
    }

    pub fn metrics(&self) -> &BookingMetrics {
        &self.metrics
    }

    fn strategy(&self, kind: LockingStrategy) -> Arc<dyn BookingStrategy> {
        match kind {
            LockingStrategy::RowLock => self.row_lock.clone() as Arc<dyn BookingStrategy>,
            LockingStrategy::DistributedLock => self.distributed.clone() as Arc<dyn BookingStrategy>,
        }
    }

    pub async fn book_seat(
        &self,
        command: &BookingCommand,
        strategy: Option<LockingStrategy>,
    ) -> CoreResult<BookingResult> {
        self.book_seat_with_cancel(command, strategy, &CancellationToken::new())
            .await
    }

    /// Like [`book_seat`](Self::book_seat), but a lock wait in progress gives
    /// up with `Interrupted` once `cancel` fires.
    ///
    /// The attempt runs on its own task: dropping the returned future does not
    /// stop a booking that already started, so every commit is still recorded
    /// and announced.
    pub async fn book_seat_with_cancel(
        &self,
        command: &BookingCommand,
        strategy: Option<LockingStrategy>,
        cancel: &CancellationToken,
    ) -> CoreResult<BookingResult> {
        let request = command.validate()?;
        let strategy = self.strategy(strategy.unwrap_or(self.default_strategy));

        let attempt = tokio::spawn(run_attempt(
            strategy,
            request,
            cancel.clone(),
            self.sink.clone(),
            self.metrics.clone(),
        ));

        match attempt.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Booking task failed: {}", e);
                Err(BookingError::Store(format!("booking task failed: {}", e)))
            }
        }
    }
}

async fn run_attempt(
    strategy: Arc<dyn BookingStrategy>,
    request: SeatRequest,
    cancel: CancellationToken,
    sink: Arc<dyn SeatEventSink>,
    metrics: BookingMetrics,
) -> CoreResult<BookingResult> {
    let kind = strategy.kind();

    let start = Instant::now();
    let outcome = strategy.book(&request, &cancel).await;
    let elapsed = start.elapsed();

    metrics.observe(kind, &outcome, elapsed);

    match &outcome {
        Ok(result) => {
            info!(
                "Seat {} booked by {} using {} in {}ms",
                result.seat_id,
                result.booked_by,
                kind,
                elapsed.as_millis()
            );
            // Fire and forget: a slow sink never holds back the result.
            let event = result.to_event();
            tokio::spawn(async move {
                sink.publish(&event).await;
            });
        }
        Err(e) => {
            warn!(
                "Booking of seat {} for {} using {} failed after {}ms: {}",
                request.seat_id,
                request.user_id,
                kind,
                elapsed.as_millis(),
                e
            );
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed_lock::LockSettings;
    use async_trait::async_trait;
    use boxoffice_core::{LeaseToken, LockCoordinator, LockError, SeatId, SeatStore};
    use boxoffice_shared::SeatUpdatedEvent;
    use boxoffice_store::{MemoryLockCoordinator, MemorySeatStore};
    use futures_util::future::join_all;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<SeatUpdatedEvent>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<SeatUpdatedEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SeatEventSink for RecordingSink {
        async fn publish(&self, event: &SeatUpdatedEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    /// Publishing never completes.
    struct HangingSink;

    #[async_trait]
    impl SeatEventSink for HangingSink {
        async fn publish(&self, _event: &SeatUpdatedEvent) {
            std::future::pending::<()>().await
        }
    }

    /// Coordinator whose release takes a while, like a slow Redis round trip.
    struct SlowRelease(MemoryLockCoordinator);

    #[async_trait]
    impl LockCoordinator for SlowRelease {
        async fn try_acquire(
            &self,
            key: &str,
            wait: Duration,
            lease: Duration,
            cancel: &CancellationToken,
        ) -> Result<Option<LeaseToken>, LockError> {
            self.0.try_acquire(key, wait, lease, cancel).await
        }

        async fn release(&self, token: &LeaseToken) -> Result<(), LockError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.0.release(token).await
        }
    }

    /// Waits for detached publishes to land, then returns what was recorded.
    async fn settled_events(sink: &RecordingSink, expected: usize) -> Vec<SeatUpdatedEvent> {
        for _ in 0..200 {
            if sink.events().len() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sink.events()
    }

    fn orchestrator_with(
        store: &MemorySeatStore,
        coordinator: Arc<dyn LockCoordinator>,
        sink: Arc<dyn SeatEventSink>,
    ) -> Arc<BookingOrchestrator> {
        Arc::new(BookingOrchestrator::new(
            RowLockStrategy::new(Arc::new(store.clone())),
            DistributedLockStrategy::new(Arc::new(store.clone()), coordinator, LockSettings::default()),
            sink,
            BookingMetrics::unregistered().unwrap(),
        ))
    }

    struct Fixture {
        store: MemorySeatStore,
        locks: MemoryLockCoordinator,
        sink: Arc<RecordingSink>,
        orchestrator: Arc<BookingOrchestrator>,
    }

    fn fixture(labels: &[&str]) -> Fixture {
        let store = MemorySeatStore::with_labels(labels.iter().copied());
        let locks = MemoryLockCoordinator::new(Duration::from_millis(2));
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator_with(&store, Arc::new(locks.clone()), sink.clone());

        Fixture { store, locks, sink, orchestrator }
    }

    fn seat_labels(count: usize) -> Vec<String> {
        (1..=count).map(|n| format!("A{}", n)).collect()
    }

    async fn race(
        fx: &Fixture,
        seat_id: i64,
        contenders: usize,
        strategy: LockingStrategy,
    ) -> Vec<CoreResult<BookingResult>> {
        let tasks = (0..contenders).map(|n| {
            let orchestrator = fx.orchestrator.clone();
            tokio::spawn(async move {
                let command = BookingCommand::new(seat_id, format!("user-{}", n));
                orchestrator.book_seat(&command, Some(strategy)).await
            })
        });

        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect()
    }

    async fn assert_single_winner(strategy: LockingStrategy) -> Fixture {
        let labels = seat_labels(3);
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        let fx = fixture(&labels);

        let outcomes = race(&fx, 2, 16, strategy).await;

        let winners: Vec<&BookingResult> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "exactly one booking must win");
        let winner = winners[0];

        for outcome in &outcomes {
            if let Err(e) = outcome {
                assert_eq!(
                    e,
                    &BookingError::SeatOccupied {
                        seat_id: SeatId(2),
                        booked_by: winner.booked_by.clone(),
                        booked_at: winner.booked_at,
                    }
                );
            }
        }

        let stored = fx.store.find_seat(SeatId(2)).await.unwrap().unwrap();
        assert_eq!(stored.booked_by(), Some(winner.booked_by.as_str()));
        assert_eq!(stored.booked_at(), Some(winner.booked_at));
        assert_eq!(stored.version, 1);
        assert_eq!(fx.store.commit_count(), 1);

        // Neighbouring seats are untouched.
        for other in [1, 3] {
            assert!(!fx.store.find_seat(SeatId(other)).await.unwrap().unwrap().is_booked());
        }

        assert_eq!(settled_events(&fx.sink, 1).await.len(), 1);
        assert_eq!(fx.orchestrator.metrics().conflict_count(), 15);
        fx
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_row_lock_single_winner() {
        let fx = assert_single_winner(LockingStrategy::RowLock).await;
        assert_eq!(fx.locks.acquired_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distributed_lock_single_winner() {
        let fx = assert_single_winner(LockingStrategy::DistributedLock).await;
        assert_eq!(fx.locks.acquired_count(), 16);
        assert_eq!(fx.locks.released_count(), 16);
        assert!(!fx.locks.is_held("lock:seat:2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mixed_strategies_still_single_winner() {
        let fx = fixture(&["A1"]);

        let tasks = (0..12).map(|n| {
            let orchestrator = fx.orchestrator.clone();
            let strategy = if n % 2 == 0 {
                LockingStrategy::RowLock
            } else {
                LockingStrategy::DistributedLock
            };
            tokio::spawn(async move {
                let command = BookingCommand::new(1, format!("user-{}", n));
                orchestrator.book_seat(&command, Some(strategy)).await
            })
        });
        let outcomes: Vec<_> = join_all(tasks).await.into_iter().map(|j| j.unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(BookingError::is_conflict));
        assert_eq!(fx.store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_first_user_wins_second_sees_occupied() {
        let labels = seat_labels(42);
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        let fx = fixture(&labels);

        let first = fx
            .orchestrator
            .book_seat(&BookingCommand::new(42, "A"), Some(LockingStrategy::RowLock))
            .await
            .unwrap();
        assert_eq!(first.seat_id, SeatId(42));
        assert_eq!(first.seat_number, "A42");
        assert_eq!(first.booked_by, "A");

        let err = fx
            .orchestrator
            .book_seat(&BookingCommand::new(42, "B"), Some(LockingStrategy::DistributedLock))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BookingError::SeatOccupied {
                seat_id: SeatId(42),
                booked_by: "A".to_string(),
                booked_at: first.booked_at,
            }
        );

        // Repeating the losing request gives the same answer.
        let again = fx
            .orchestrator
            .book_seat(&BookingCommand::new(42, "B"), None)
            .await
            .unwrap_err();
        assert_eq!(again, err);

        let stored = fx.store.find_seat(SeatId(42)).await.unwrap().unwrap();
        assert_eq!(stored.booked_by(), Some("A"));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_success_publishes_exactly_once() {
        let labels = seat_labels(7);
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        let fx = fixture(&labels);

        let result = fx
            .orchestrator
            .book_seat(&BookingCommand::new(7, "alice"), None)
            .await
            .unwrap();

        let events = settled_events(&fx.sink, 1).await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            SeatUpdatedEvent {
                seat_id: 7,
                seat_number: "A7".to_string(),
                booked_by: Some("alice".to_string()),
                booked_at: Some(result.booked_at),
                booked: true,
            }
        );

        // A losing attempt publishes nothing.
        fx.orchestrator
            .book_seat(&BookingCommand::new(7, "bob"), None)
            .await
            .unwrap_err();
        fx.orchestrator
            .book_seat(&BookingCommand::new(99, "bob"), Some(LockingStrategy::RowLock))
            .await
            .unwrap_err();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fx.sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_caller_still_announces_commit() {
        let store = MemorySeatStore::with_labels(["A1"]);
        let locks = MemoryLockCoordinator::default();
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator_with(&store, Arc::new(SlowRelease(locks.clone())), sink.clone());

        let caller = tokio::spawn(async move {
            orchestrator
                .book_seat(&BookingCommand::new(1, "alice"), Some(LockingStrategy::DistributedLock))
                .await
        });

        for _ in 0..100 {
            if store.commit_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.commit_count(), 1);

        // The caller goes away while the lock release is still in flight.
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        let events = settled_events(&sink, 1).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].booked_by.as_deref(), Some("alice"));

        for _ in 0..100 {
            if !locks.is_held("lock:seat:1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!locks.is_held("lock:seat:1"));
        assert_eq!(locks.released_count(), 1);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_hanging_sink_does_not_delay_result() {
        let store = MemorySeatStore::with_labels(["A1"]);
        let orchestrator = orchestrator_with(
            &store,
            Arc::new(MemoryLockCoordinator::default()),
            Arc::new(HangingSink),
        );

        let outcome = tokio::time::timeout(
            Duration::from_millis(500),
            orchestrator.book_seat(&BookingCommand::new(1, "alice"), Some(LockingStrategy::RowLock)),
        )
        .await;

        let result = outcome.expect("booking must not wait for the sink").unwrap();
        assert_eq!(result.booked_by, "alice");
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_default_strategy_is_distributed_lock() {
        let fx = fixture(&["A1"]);
        assert_eq!(fx.orchestrator.default_strategy(), LockingStrategy::DistributedLock);

        fx.orchestrator
            .book_seat(&BookingCommand::new(1, "alice"), None)
            .await
            .unwrap();
        assert_eq!(fx.locks.acquired_count(), 1);
        assert_eq!(
            fx.orchestrator
                .metrics()
                .attempt_count(LockingStrategy::DistributedLock, "booked"),
            1
        );
    }

    #[tokio::test]
    async fn test_configured_default_strategy() {
        let store = MemorySeatStore::with_labels(["A1"]);
        let locks = MemoryLockCoordinator::default();
        let orchestrator = BookingOrchestrator::new(
            RowLockStrategy::new(Arc::new(store.clone())),
            DistributedLockStrategy::new(Arc::new(store.clone()), Arc::new(locks.clone()), LockSettings::default()),
            Arc::new(RecordingSink::default()),
            BookingMetrics::unregistered().unwrap(),
        )
        .with_default_strategy(LockingStrategy::RowLock);

        orchestrator
            .book_seat(&BookingCommand::new(1, "alice"), None)
            .await
            .unwrap();
        assert_eq!(locks.acquired_count(), 0);
        assert_eq!(orchestrator.metrics().attempt_count(LockingStrategy::RowLock, "booked"), 1);
    }

    #[tokio::test]
    async fn test_invalid_command_touches_nothing() {
        let fx = fixture(&["A1"]);

        let missing_seat = BookingCommand { seat_id: None, user_id: "alice".to_string() };
        let blank_user = BookingCommand::new(1, "   ");

        for command in [missing_seat, blank_user] {
            let err = fx.orchestrator.book_seat(&command, None).await.unwrap_err();
            assert!(matches!(err, BookingError::InvalidCommand(_)));
        }

        assert_eq!(fx.store.commit_count(), 0);
        assert_eq!(fx.locks.acquired_count(), 0);
        assert!(fx.sink.events().is_empty());
        assert_eq!(
            fx.orchestrator
                .metrics()
                .attempt_count(LockingStrategy::DistributedLock, "INVALID_COMMAND"),
            0
        );
    }

    #[tokio::test]
    async fn test_cancelled_caller_is_interrupted() {
        let fx = fixture(&["A1"]);
        let _held = fx
            .locks
            .try_acquire("lock:seat:1", Duration::ZERO, Duration::from_secs(30), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fx
            .orchestrator
            .book_seat_with_cancel(&BookingCommand::new(1, "alice"), None, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, BookingError::Interrupted { seat_id: SeatId(1) });
        assert!(cancel.is_cancelled());
        assert!(fx.sink.events().is_empty());
    }
}
