use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::repository::{
    BookingRecords, BookingStorage, SeatLedger, StorageTransaction, StoreError, StoreResult,
};
use marquee_core::{Booking, BookingSeat, BookingStatus, Seat, SeatId, SeatStatus, ShowtimeId, UserId};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

/// Seat ledger and booking records in Postgres.
pub struct PgBookingStorage {
    pool: PgPool,
}

impl PgBookingStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct SeatRow {
    id: i64,
    showtime_id: i64,
    label: String,
    status: String,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: i64,
    showtime_id: i64,
    total_minor: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct BookingSeatRow {
    id: Uuid,
    booking_id: Uuid,
    seat_id: i64,
    price_minor: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: row.id,
            showtime_id: row.showtime_id,
            label: row.label,
            status: row.status.parse::<SeatStatus>()?,
        })
    }
}

impl From<BookingSeatRow> for BookingSeat {
    fn from(row: BookingSeatRow) -> Self {
        BookingSeat {
            id: row.id,
            booking_id: row.booking_id,
            seat_id: row.seat_id,
            price_minor: row.price_minor,
            created_at: row.created_at,
        }
    }
}

fn assemble(row: BookingRow, seats: Vec<BookingSeat>) -> StoreResult<Booking> {
    Ok(Booking {
        id: row.id,
        user_id: row.user_id,
        showtime_id: row.showtime_id,
        total_minor: row.total_minor,
        status: row.status.parse::<BookingStatus>()?,
        seats,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

const BOOKING_COLUMNS: &str = "id, user_id, showtime_id, total_minor, status, created_at, updated_at";

async fn load_lines<'e, E>(executor: E, booking_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Vec<BookingSeat>>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, BookingSeatRow>(
        "SELECT id, booking_id, seat_id, price_minor, created_at FROM booking_seats WHERE booking_id = ANY($1) ORDER BY created_at, id",
    )
    .bind(booking_ids)
    .fetch_all(executor)
    .await?;

    let mut lines: HashMap<Uuid, Vec<BookingSeat>> = HashMap::new();
    for row in rows {
        lines.entry(row.booking_id).or_default().push(row.into());
    }
    Ok(lines)
}

#[async_trait]
impl BookingStorage for PgBookingStorage {
    async fn begin(&self) -> StoreResult<Box<dyn StorageTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStorageTransaction { tx }))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut lines = load_lines(&self.pool, &[id]).await?;
                let seats = lines.remove(&id).unwrap_or_default();
                Ok(Some(assemble(row, seats)?))
            }
            None => Ok(None),
        }
    }

    async fn list_user_bookings(&self, user_id: UserId) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut lines = load_lines(&self.pool, &ids).await?;

        rows.into_iter()
            .map(|row| {
                let seats = lines.remove(&row.id).unwrap_or_default();
                assemble(row, seats)
            })
            .collect()
    }

    async fn list_showtime_seats(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT id, showtime_id, label, status FROM seats WHERE showtime_id = $1 ORDER BY id",
        )
        .bind(showtime_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Seat::try_from).collect()
    }
}

/// One Postgres transaction. Dropping it without commit rolls back.
pub struct PgStorageTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SeatLedger for PgStorageTransaction {
    async fn seat_for_update(&mut self, seat_id: SeatId) -> StoreResult<Option<Seat>> {
        let row = sqlx::query_as::<_, SeatRow>(
            "SELECT id, showtime_id, label, status FROM seats WHERE id = $1 FOR UPDATE",
        )
        .bind(seat_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Seat::try_from).transpose()
    }

    async fn update_seat_status(&mut self, seat_id: SeatId, status: SeatStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE seats SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(seat_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(format!("seat {} does not exist", seat_id).into());
        }
        Ok(())
    }
}

#[async_trait]
impl BookingRecords for PgStorageTransaction {
    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, showtime_id, total_minor, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.showtime_id)
        .bind(booking.total_minor)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for line in &booking.seats {
            sqlx::query(
                r#"
                INSERT INTO booking_seats (id, booking_id, seat_id, price_minor, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(line.id)
            .bind(line.booking_id)
            .bind(line.seat_id)
            .bind(line.price_minor)
            .bind(line.created_at)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn booking_for_update(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                let mut lines = load_lines(&mut *self.tx, &[id]).await?;
                let seats = lines.remove(&id).unwrap_or_default();
                Ok(Some(assemble(row, seats)?))
            }
            None => Ok(None),
        }
    }

    async fn update_booking_status(&mut self, id: Uuid, status: BookingStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE bookings SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(format!("booking {} does not exist", id).into());
        }
        Ok(())
    }
}

#[async_trait]
impl StorageTransaction for PgStorageTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking_row(status: &str) -> BookingRow {
        let now = Utc::now();
        BookingRow {
            id: Uuid::new_v4(),
            user_id: 1,
            showtime_id: 2,
            total_minor: 2000,
            status: status.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_assemble_booking() {
        let row = booking_row("CANCELLED");
        let line = BookingSeat::new(row.id, 11, 1000);
        let booking = assemble(row, vec![line.clone()]).unwrap();

        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.seats, vec![line]);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(assemble(booking_row("PENDING"), vec![]).is_err());

        let seat = SeatRow {
            id: 1,
            showtime_id: 1,
            label: "A1".to_string(),
            status: "HELD".to_string(),
        };
        assert!(Seat::try_from(seat).is_err());
    }
}
