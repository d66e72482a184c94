//! In-process seat store and lock coordinator.
//!
//! Both honour the same contracts as the Postgres and Redis backends, so the
//! booking strategies can be exercised (and run in single-node setups)
//! without external services.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use boxoffice_core::{
    BookingError, CoreResult, LeaseToken, LockCoordinator, LockError, Seat, SeatId, SeatStore,
    SeatTransaction,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::lock_wait::{acquire_with_retry, deadline_after, LeaseBackend};

#[derive(Default)]
struct Tables {
    rows: RwLock<BTreeMap<SeatId, Seat>>,
    row_locks: Mutex<HashMap<SeatId, Arc<Mutex<()>>>>,
    next_id: AtomicI64,
    commits: AtomicUsize,
}

/// Seat store kept in memory. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct MemorySeatStore {
    tables: Arc<Tables>,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with available seats, ids assigned from 1 in label order.
    pub fn with_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rows = BTreeMap::new();
        let mut next = 0;
        for label in labels {
            next += 1;
            rows.insert(SeatId(next), Seat::new(SeatId(next), label));
        }

        Self {
            tables: Arc::new(Tables {
                rows: RwLock::new(rows),
                row_locks: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(next),
                commits: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of transactions that committed at least one write.
    pub fn commit_count(&self) -> usize {
        self.tables.commits.load(Ordering::SeqCst)
    }

    /// Number of seats that ever had a row lock taken.
    pub async fn locked_row_count(&self) -> usize {
        self.tables.row_locks.lock().await.len()
    }
}

#[async_trait]
impl SeatStore for MemorySeatStore {
    async fn begin(&self) -> CoreResult<Box<dyn SeatTransaction>> {
        Ok(Box::new(MemorySeatTransaction {
            tables: self.tables.clone(),
            row_guards: HashMap::new(),
            staged: BTreeMap::new(),
            finished: false,
        }))
    }

    async fn find_seat(&self, id: SeatId) -> CoreResult<Option<Seat>> {
        Ok(self.tables.rows.read().await.get(&id).cloned())
    }

    async fn list_seats(&self) -> CoreResult<Vec<Seat>> {
        Ok(self.tables.rows.read().await.values().cloned().collect())
    }

    async fn seed_seats(&self, labels: &[String]) -> CoreResult<usize> {
        let mut rows = self.tables.rows.write().await;
        let mut created = 0;

        for label in labels {
            if rows.values().any(|seat| &seat.seat_number == label) {
                continue;
            }
            let id = SeatId(self.tables.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            rows.insert(id, Seat::new(id, label.clone()));
            created += 1;
        }

        Ok(created)
    }
}

/// Writes are staged and applied on commit, after checking that every
/// touched row still has the version it had when first saved.
pub struct MemorySeatTransaction {
    tables: Arc<Tables>,
    row_guards: HashMap<SeatId, OwnedMutexGuard<()>>,
    // seat id -> (version read from the store, staged seat)
    staged: BTreeMap<SeatId, (i64, Seat)>,
    finished: bool,
}

impl MemorySeatTransaction {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.finished {
            return Err(BookingError::Store("transaction already finished".to_string()));
        }
        Ok(())
    }

    async fn read(&self, id: SeatId) -> CoreResult<Seat> {
        if let Some((_, seat)) = self.staged.get(&id) {
            return Ok(seat.clone());
        }
        self.tables
            .rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(BookingError::SeatNotFound(id))
    }

    fn end(&mut self) {
        self.finished = true;
        self.staged.clear();
        self.row_guards.clear();
    }
}

#[async_trait]
impl SeatTransaction for MemorySeatTransaction {
    async fn fetch_for_update(&mut self, id: SeatId) -> CoreResult<Seat> {
        self.ensure_open()?;

        if !self.tables.rows.read().await.contains_key(&id) {
            return Err(BookingError::SeatNotFound(id));
        }

        if !self.row_guards.contains_key(&id) {
            let row_lock = self
                .tables
                .row_locks
                .lock()
                .await
                .entry(id)
                .or_default()
                .clone();
            let guard = row_lock.lock_owned().await;
            self.row_guards.insert(id, guard);
        }

        self.read(id).await
    }

    async fn fetch(&mut self, id: SeatId) -> CoreResult<Seat> {
        self.ensure_open()?;
        self.read(id).await
    }

    async fn save(&mut self, seat: &Seat) -> CoreResult<Seat> {
        self.ensure_open()?;

        let (base, current) = match self.staged.get(&seat.id) {
            Some((base, staged)) => (*base, staged.version),
            None => {
                let stored = self
                    .tables
                    .rows
                    .read()
                    .await
                    .get(&seat.id)
                    .map(|s| s.version)
                    .ok_or(BookingError::SeatNotFound(seat.id))?;
                (stored, stored)
            }
        };

        if current != seat.version {
            return Err(BookingError::PersistenceConflict(seat.id));
        }

        let mut saved = seat.clone();
        saved.version += 1;
        self.staged.insert(seat.id, (base, saved.clone()));
        Ok(saved)
    }

    async fn commit(&mut self) -> CoreResult<()> {
        self.ensure_open()?;

        let staged = std::mem::take(&mut self.staged);
        let outcome = {
            let mut rows = self.tables.rows.write().await;
            let mut conflict = None;
            for (id, (base, _)) in &staged {
                match rows.get(id) {
                    Some(stored) if stored.version == *base => {}
                    Some(_) => conflict = Some(BookingError::PersistenceConflict(*id)),
                    None => conflict = Some(BookingError::SeatNotFound(*id)),
                }
                if conflict.is_some() {
                    break;
                }
            }

            match conflict {
                Some(err) => Err(err),
                None => {
                    let wrote = !staged.is_empty();
                    for (id, (_, seat)) in staged {
                        rows.insert(id, seat);
                    }
                    if wrote {
                        self.tables.commits.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(())
                }
            }
        };

        self.end();
        outcome
    }

    async fn rollback(&mut self) -> CoreResult<()> {
        self.end();
        Ok(())
    }
}

#[derive(Default)]
struct LeaseTable {
    // key -> (owner, expiry)
    leases: std::sync::Mutex<HashMap<String, (String, Instant)>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Lock coordinator for a single process. Leases expire like Redis keys.
#[derive(Clone)]
pub struct MemoryLockCoordinator {
    table: Arc<LeaseTable>,
    retry_interval: Duration,
}

impl Default for MemoryLockCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

impl MemoryLockCoordinator {
    pub fn new(retry_interval: Duration) -> Self {
        Self {
            table: Arc::new(LeaseTable::default()),
            retry_interval,
        }
    }

    /// True while `key` is held by a lease that has not expired.
    pub fn is_held(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.table.leases.lock() {
            Ok(leases) => leases.get(key).map_or(false, |(_, expiry)| *expiry > now),
            Err(_) => false,
        }
    }

    pub fn acquired_count(&self) -> usize {
        self.table.acquired.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.table.released.load(Ordering::SeqCst)
    }
}

fn poisoned() -> LockError {
    LockError::Backend("lease table poisoned".to_string())
}

#[async_trait]
impl LeaseBackend for MemoryLockCoordinator {
    async fn try_claim(&self, token: &LeaseToken, lease: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut leases = self.table.leases.lock().map_err(|_| poisoned())?;

        if let Some((_, expiry)) = leases.get(token.key()) {
            if *expiry > now {
                return Ok(false);
            }
        }

        let expiry = deadline_after(now, lease);
        leases.insert(token.key().to_string(), (token.owner().to_string(), expiry));
        self.table.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[async_trait]
impl LockCoordinator for MemoryLockCoordinator {
    async fn try_acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<LeaseToken>, LockError> {
        acquire_with_retry(self, key, wait, lease, self.retry_interval, cancel).await
    }

    async fn release(&self, token: &LeaseToken) -> Result<(), LockError> {
        let mut leases = self.table.leases.lock().map_err(|_| poisoned())?;
        let owned = leases
            .get(token.key())
            .map_or(false, |(owner, _)| owner == token.owner());

        if owned {
            leases.remove(token.key());
            self.table.released.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
