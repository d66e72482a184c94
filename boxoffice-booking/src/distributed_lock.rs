use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use boxoffice_core::{
    BookingError, BookingResult, CoreResult, LockCoordinator, LockError, LockingStrategy, SeatId,
    SeatRequest, SeatStore,
};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lease::LeaseGuard;
use crate::strategy::{persist_claim, BookingStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// How long to wait for a busy lock before giving up.
    pub wait: Duration,
    /// Expiry of a granted lock if its holder never releases it.
    pub lease: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(2),
            lease: Duration::from_secs(5),
        }
    }
}

pub fn lock_key(seat_id: SeatId) -> String {
    format!("lock:seat:{}", seat_id)
}

/// Serializes bookings of a seat through the lock coordinator, then runs the
/// read-check-write in an ordinary store transaction.
pub struct DistributedLockStrategy {
    store: Arc<dyn SeatStore>,
    coordinator: Arc<dyn LockCoordinator>,
    settings: LockSettings,
}

impl DistributedLockStrategy {
    pub fn new(
        store: Arc<dyn SeatStore>,
        coordinator: Arc<dyn LockCoordinator>,
        settings: LockSettings,
    ) -> Self {
        Self { store, coordinator, settings }
    }

    async fn claim(&self, request: &SeatRequest) -> CoreResult<BookingResult> {
        let mut tx = self.store.begin().await?;
        let mut seat = tx.fetch(request.seat_id).await?;
        seat.book(&request.user_id, Utc::now())?;
        persist_claim(self.store.as_ref(), tx, &seat).await
    }
}

#[async_trait]
impl BookingStrategy for DistributedLockStrategy {
    fn kind(&self) -> LockingStrategy {
        LockingStrategy::DistributedLock
    }

    async fn book(&self, request: &SeatRequest, cancel: &CancellationToken) -> CoreResult<BookingResult> {
        let seat_id = request.seat_id;

        // Seats are never deleted, so an unknown id can be rejected without
        // ever touching the coordinator.
        if self.store.find_seat(seat_id).await?.is_none() {
            return Err(BookingError::SeatNotFound(seat_id));
        }

        let key = lock_key(seat_id);
        let lock_start = Instant::now();
        let acquired = self
            .coordinator
            .try_acquire(&key, self.settings.wait, self.settings.lease, cancel)
            .await;

        let token = match acquired {
            Ok(Some(token)) => token,
            Ok(None) => {
                return Err(BookingError::LockAcquisitionTimeout {
                    seat_id,
                    wait: self.settings.wait,
                })
            }
            Err(LockError::Cancelled) => {
                // The caller's token stays cancelled; we only report it.
                warn!("Lock wait for seat {} was cancelled", seat_id);
                return Err(BookingError::Interrupted { seat_id });
            }
            Err(LockError::Backend(msg)) => return Err(BookingError::Lock(msg)),
        };

        debug!(
            "Seat {} locked via {} for user {} in {}ms",
            seat_id,
            key,
            request.user_id,
            lock_start.elapsed().as_millis()
        );

        let guard = LeaseGuard::new(self.coordinator.clone(), token);
        let outcome = self.claim(request).await;
        guard.release().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_store::{MemoryLockCoordinator, MemorySeatStore};

    fn request(seat_id: i64, user_id: &str) -> SeatRequest {
        SeatRequest { seat_id: SeatId(seat_id), user_id: user_id.to_string() }
    }

    fn strategy(store: &MemorySeatStore, locks: &MemoryLockCoordinator, wait: Duration) -> DistributedLockStrategy {
        DistributedLockStrategy::new(
            Arc::new(store.clone()),
            Arc::new(locks.clone()),
            LockSettings { wait, lease: Duration::from_secs(5) },
        )
    }

    #[test]
    fn test_lock_key_is_per_seat() {
        assert_eq!(lock_key(SeatId(42)), "lock:seat:42");
        assert_ne!(lock_key(SeatId(1)), lock_key(SeatId(11)));
    }

    #[tokio::test]
    async fn test_books_and_releases_lock() {
        let store = MemorySeatStore::with_labels(["A1"]);
        let locks = MemoryLockCoordinator::default();
        let strategy = strategy(&store, &locks, Duration::from_millis(100));

        let result = strategy.book(&request(1, "alice"), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.booked_by, "alice");
        assert!(result.booked);
        assert!(!locks.is_held("lock:seat:1"));
        assert_eq!(locks.acquired_count(), 1);
        assert_eq!(locks.released_count(), 1);
    }

    #[tokio::test]
    async fn test_occupied_seat_still_releases_lock() {
        let store = MemorySeatStore::with_labels(["A1"]);
        let locks = MemoryLockCoordinator::default();
        let strategy = strategy(&store, &locks, Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let first = strategy.book(&request(1, "alice"), &cancel).await.unwrap();
        let err = strategy.book(&request(1, "bob"), &cancel).await.unwrap_err();

        assert_eq!(
            err,
            BookingError::SeatOccupied {
                seat_id: SeatId(1),
                booked_by: "alice".to_string(),
                booked_at: first.booked_at,
            }
        );
        assert!(!locks.is_held("lock:seat:1"));
        assert_eq!(locks.released_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_seat_never_touches_coordinator() {
        let store = MemorySeatStore::with_labels(["A1"]);
        let locks = MemoryLockCoordinator::default();
        let strategy = strategy(&store, &locks, Duration::from_millis(100));

        let err = strategy.book(&request(404, "alice"), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, BookingError::SeatNotFound(SeatId(404)));
        assert_eq!(locks.acquired_count(), 0);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_busy_lock_times_out_without_touching_seat() {
        let store = MemorySeatStore::with_labels(["A1"]);
        let locks = MemoryLockCoordinator::default();
        let strategy = strategy(&store, &locks, Duration::from_millis(50));

        // Someone else holds the seat's lock for longer than we will wait.
        let foreign = locks
            .try_acquire("lock:seat:1", Duration::ZERO, Duration::from_secs(30), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        let err = strategy.book(&request(1, "alice"), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(
            err,
            BookingError::LockAcquisitionTimeout { seat_id: SeatId(1), wait: Duration::from_millis(50) }
        );

        let seat = store.find_seat(SeatId(1)).await.unwrap().unwrap();
        assert!(!seat.is_booked());
        assert_eq!(seat.version, 0);
        assert_eq!(store.commit_count(), 0);

        // The foreign lease was not disturbed.
        assert!(locks.is_held("lock:seat:1"));
        locks.release(&foreign).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_wait_is_interrupted_and_stays_cancelled() {
        let store = MemorySeatStore::with_labels(["A1"]);
        let locks = MemoryLockCoordinator::default();
        let strategy = strategy(&store, &locks, Duration::from_secs(10));

        let _foreign = locks
            .try_acquire("lock:seat:1", Duration::ZERO, Duration::from_secs(30), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = strategy.book(&request(1, "alice"), &cancel).await.unwrap_err();
        assert_eq!(err, BookingError::Interrupted { seat_id: SeatId(1) });
        assert!(cancel.is_cancelled());
        assert!(!store.find_seat(SeatId(1)).await.unwrap().unwrap().is_booked());
    }

    /// Store whose transactions never open, parking a booking inside its
    /// critical section.
    struct StalledStore(MemorySeatStore);

    #[async_trait]
    impl SeatStore for StalledStore {
        async fn begin(&self) -> CoreResult<Box<dyn boxoffice_core::SeatTransaction>> {
            std::future::pending().await
        }

        async fn find_seat(&self, id: SeatId) -> CoreResult<Option<boxoffice_core::Seat>> {
            self.0.find_seat(id).await
        }

        async fn list_seats(&self) -> CoreResult<Vec<boxoffice_core::Seat>> {
            self.0.list_seats().await
        }

        async fn seed_seats(&self, labels: &[String]) -> CoreResult<usize> {
            self.0.seed_seats(labels).await
        }
    }

    #[tokio::test]
    async fn test_dropped_booking_releases_lock() {
        let store = MemorySeatStore::with_labels(["A1"]);
        let locks = MemoryLockCoordinator::default();
        let strategy = DistributedLockStrategy::new(
            Arc::new(StalledStore(store.clone())),
            Arc::new(locks.clone()),
            LockSettings::default(),
        );

        let inflight = tokio::spawn(async move {
            strategy.book(&request(1, "carol"), &CancellationToken::new()).await
        });

        for _ in 0..50 {
            if locks.is_held("lock:seat:1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(locks.is_held("lock:seat:1"));

        inflight.abort();
        assert!(inflight.await.unwrap_err().is_cancelled());

        for _ in 0..50 {
            if !locks.is_held("lock:seat:1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!locks.is_held("lock:seat:1"));
        assert_eq!(locks.released_count(), 1);
        assert!(!store.find_seat(SeatId(1)).await.unwrap().unwrap().is_booked());
    }
}
