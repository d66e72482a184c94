use async_trait::async_trait;
use boxoffice_core::{BookingError, CoreResult, Seat, SeatId, SeatStore, SeatTransaction};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, info};

const SEAT_COLUMNS: &str = "id, seat_number, booked_by, booked_at, version";

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: i64,
    seat_number: String,
    booked_by: Option<String>,
    booked_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<SeatRow> for Seat {
    type Error = BookingError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Seat::from_parts(
            SeatId(row.id),
            row.seat_number,
            row.booked_by,
            row.booked_at,
            row.version,
        )
    }
}

fn store_err(e: sqlx::Error) -> BookingError {
    BookingError::Store(e.to_string())
}

pub struct PostgresSeatRepository {
    pool: PgPool,
}

impl PostgresSeatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SeatStore for PostgresSeatRepository {
    async fn begin(&self) -> CoreResult<Box<dyn SeatTransaction>> {
        let tx = self.pool.begin().await.map_err(store_err)?;
        Ok(Box::new(PostgresSeatTransaction { tx: Some(tx) }))
    }

    async fn find_seat(&self, id: SeatId) -> CoreResult<Option<Seat>> {
        let row = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE id = $1",
            SEAT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(Seat::try_from).transpose()
    }

    async fn list_seats(&self) -> CoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats ORDER BY id",
            SEAT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn seed_seats(&self, labels: &[String]) -> CoreResult<usize> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut created = 0u64;

        for label in labels {
            let result = sqlx::query(
                "INSERT INTO seats (seat_number) VALUES ($1) ON CONFLICT (seat_number) DO NOTHING",
            )
            .bind(label)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
            created += result.rows_affected();
        }

        tx.commit().await.map_err(store_err)?;
        info!("Seeded {} new seats ({} requested)", created, labels.len());
        Ok(created as usize)
    }
}

/// Wraps one Postgres transaction. `None` once committed or rolled back;
/// if the wrapper is dropped while still open, sqlx rolls the transaction back.
pub struct PostgresSeatTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresSeatTransaction {
    fn conn(&mut self) -> CoreResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| BookingError::Store("transaction already finished".to_string()))
    }
}

#[async_trait]
impl SeatTransaction for PostgresSeatTransaction {
    async fn fetch_for_update(&mut self, id: SeatId) -> CoreResult<Seat> {
        // FOR UPDATE blocks other lockers of this row until we commit or roll back.
        let row = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE id = $1 FOR UPDATE",
            SEAT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(self.conn()?)
        .await
        .map_err(store_err)?;

        row.ok_or(BookingError::SeatNotFound(id))?.try_into()
    }

    async fn fetch(&mut self, id: SeatId) -> CoreResult<Seat> {
        let row = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE id = $1",
            SEAT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(self.conn()?)
        .await
        .map_err(store_err)?;

        row.ok_or(BookingError::SeatNotFound(id))?.try_into()
    }

    async fn save(&mut self, seat: &Seat) -> CoreResult<Seat> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET booked_by = $1, booked_at = $2, version = version + 1
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(seat.booked_by())
        .bind(seat.booked_at())
        .bind(seat.id.0)
        .bind(seat.version)
        .execute(self.conn()?)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            debug!("Version {} of seat {} is stale", seat.version, seat.id);
            return Err(BookingError::PersistenceConflict(seat.id));
        }

        let mut saved = seat.clone();
        saved.version += 1;
        Ok(saved)
    }

    async fn commit(&mut self) -> CoreResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| BookingError::Store("transaction already finished".to_string()))?;
        tx.commit().await.map_err(store_err)
    }

    async fn rollback(&mut self) -> CoreResult<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(store_err),
            None => Ok(()),
        }
    }
}
