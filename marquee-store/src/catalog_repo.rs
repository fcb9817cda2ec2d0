use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::repository::{CatalogProvider, StoreResult};
use marquee_core::{Showtime, ShowtimeId};
use sqlx::PgPool;

/// Read-only view of the showtime catalog.
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ShowtimeRow {
    id: i64,
    movie_id: i64,
    hall_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    price_minor: i64,
}

impl From<ShowtimeRow> for Showtime {
    fn from(row: ShowtimeRow) -> Self {
        Showtime {
            id: row.id,
            movie_id: row.movie_id,
            hall_id: row.hall_id,
            start_time: row.start_time,
            end_time: row.end_time,
            price_minor: row.price_minor,
        }
    }
}

#[async_trait]
impl CatalogProvider for PgCatalog {
    async fn get_showtime(&self, id: ShowtimeId) -> StoreResult<Option<Showtime>> {
        let row = sqlx::query_as::<_, ShowtimeRow>(
            "SELECT id, movie_id, hall_id, start_time, end_time, price_minor FROM showtimes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Showtime::from))
    }
}
