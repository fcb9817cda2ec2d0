use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, Seat, SeatId, SeatStatus, Showtime, ShowtimeId, UserId};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only access to showtime timing and price
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn get_showtime(&self, id: ShowtimeId) -> StoreResult<Option<Showtime>>;
}

/// Seat rows, as seen from inside a storage transaction
#[async_trait]
pub trait SeatLedger: Send {
    /// Point lookup that holds the row until the transaction ends.
    async fn seat_for_update(&mut self, seat_id: SeatId) -> StoreResult<Option<Seat>>;

    async fn update_seat_status(&mut self, seat_id: SeatId, status: SeatStatus) -> StoreResult<()>;
}

/// Booking rows and their line items, as seen from inside a storage transaction
#[async_trait]
pub trait BookingRecords: Send {
    /// Inserts the booking row together with every line item.
    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn booking_for_update(&mut self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn update_booking_status(&mut self, id: Uuid, status: BookingStatus) -> StoreResult<()>;
}

/// All writes made through one transaction become visible together on
/// `commit`, or not at all.
#[async_trait]
pub trait StorageTransaction: SeatLedger + BookingRecords {
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait BookingStorage: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StorageTransaction>>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn list_user_bookings(&self, user_id: UserId) -> StoreResult<Vec<Booking>>;

    async fn list_showtime_seats(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Seat>>;
}
