//! In-memory backends for the storage, lock and event capabilities.
//!
//! These back the coordinator and API tests and local runs without Postgres,
//! Redis or Kafka. Transactions buffer their writes and apply them under a
//! single mutex on commit. Rows read for update or written by a transaction
//! stay locked until it commits, rolls back or is dropped, as in Postgres.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use uuid::Uuid;

use crate::events::{BookingEvent, BookingEventPublisher};
use crate::lock::{LockError, SeatLockKey, SeatLockService};
use crate::models::{Booking, BookingStatus, Seat, SeatId, SeatStatus, Showtime, ShowtimeId, UserId};
use crate::repository::{
    BookingRecords, BookingStorage, CatalogProvider, SeatLedger, StorageTransaction, StoreResult,
};

#[derive(Default)]
struct Tables {
    showtimes: HashMap<ShowtimeId, Showtime>,
    seats: BTreeMap<SeatId, Seat>,
    bookings: HashMap<Uuid, Booking>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Seat(SeatId),
    Booking(Uuid),
}

/// One mutex per row, created on first use.
#[derive(Clone, Default)]
struct RowLocks {
    rows: Arc<Mutex<HashMap<RowKey, Arc<Mutex<()>>>>>,
}

impl RowLocks {
    async fn lock(&self, key: RowKey) -> OwnedMutexGuard<()> {
        let row = self.rows.lock().await.entry(key).or_default().clone();
        row.lock_owned().await
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<Mutex<Tables>>,
    row_locks: RowLocks,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_showtime(&self, showtime: Showtime) {
        self.tables.lock().await.showtimes.insert(showtime.id, showtime);
    }

    pub async fn insert_seat(&self, seat: Seat) {
        self.tables.lock().await.seats.insert(seat.id, seat);
    }

    pub async fn seat(&self, seat_id: SeatId) -> Option<Seat> {
        self.tables.lock().await.seats.get(&seat_id).cloned()
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.lock().await.bookings.len()
    }

    /// Make the commit of the next transaction begun on this storage fail.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogProvider for InMemoryStorage {
    async fn get_showtime(&self, id: ShowtimeId) -> StoreResult<Option<Showtime>> {
        Ok(self.tables.lock().await.showtimes.get(&id).cloned())
    }
}

#[async_trait]
impl BookingStorage for InMemoryStorage {
    async fn begin(&self) -> StoreResult<Box<dyn StorageTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            row_locks: self.row_locks.clone(),
            held_rows: HashMap::new(),
            fail_commit: self.fail_next_commit.swap(false, Ordering::SeqCst),
            seat_writes: HashMap::new(),
            new_bookings: Vec::new(),
            booking_writes: HashMap::new(),
        }))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn list_user_bookings(&self, user_id: UserId) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn list_showtime_seats(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Seat>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .seats
            .values()
            .filter(|seat| seat.showtime_id == showtime_id)
            .cloned()
            .collect())
    }
}

pub struct InMemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    row_locks: RowLocks,
    held_rows: HashMap<RowKey, OwnedMutexGuard<()>>,
    fail_commit: bool,
    seat_writes: HashMap<SeatId, SeatStatus>,
    new_bookings: Vec<Booking>,
    booking_writes: HashMap<Uuid, BookingStatus>,
}

impl InMemoryTransaction {
    /// Waits for any other transaction holding `key` to finish.
    async fn hold_row(&mut self, key: RowKey) {
        if !self.held_rows.contains_key(&key) {
            let guard = self.row_locks.lock(key).await;
            self.held_rows.insert(key, guard);
        }
    }
}

#[async_trait]
impl SeatLedger for InMemoryTransaction {
    async fn seat_for_update(&mut self, seat_id: SeatId) -> StoreResult<Option<Seat>> {
        self.hold_row(RowKey::Seat(seat_id)).await;
        let seat = self.tables.lock().await.seats.get(&seat_id).cloned();
        Ok(seat.map(|mut seat| {
            if let Some(status) = self.seat_writes.get(&seat_id) {
                seat.status = *status;
            }
            seat
        }))
    }

    async fn update_seat_status(&mut self, seat_id: SeatId, status: SeatStatus) -> StoreResult<()> {
        if !self.tables.lock().await.seats.contains_key(&seat_id) {
            return Err(format!("seat {} does not exist", seat_id).into());
        }
        self.hold_row(RowKey::Seat(seat_id)).await;
        self.seat_writes.insert(seat_id, status);
        Ok(())
    }
}

#[async_trait]
impl BookingRecords for InMemoryTransaction {
    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.new_bookings.push(booking.clone());
        Ok(())
    }

    async fn booking_for_update(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.hold_row(RowKey::Booking(id)).await;
        let pending = self.new_bookings.iter().find(|b| b.id == id).cloned();
        let booking = match pending {
            Some(booking) => Some(booking),
            None => self.tables.lock().await.bookings.get(&id).cloned(),
        };
        Ok(booking.map(|mut booking| {
            if let Some(status) = self.booking_writes.get(&id) {
                booking.status = *status;
            }
            booking
        }))
    }

    async fn update_booking_status(&mut self, id: Uuid, status: BookingStatus) -> StoreResult<()> {
        self.hold_row(RowKey::Booking(id)).await;
        self.booking_writes.insert(id, status);
        Ok(())
    }
}

#[async_trait]
impl StorageTransaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        // Row locks are released when `_held_rows` drops, after the writes land.
        let InMemoryTransaction {
            tables,
            row_locks: _,
            held_rows: _held_rows,
            fail_commit,
            seat_writes,
            new_bookings,
            booking_writes,
        } = *self;
        if fail_commit {
            return Err("injected commit failure".into());
        }

        let mut tables = tables.lock().await;
        for booking in new_bookings {
            tables.bookings.insert(booking.id, booking);
        }
        let now = chrono::Utc::now();
        for (id, status) in booking_writes {
            if let Some(booking) = tables.bookings.get_mut(&id) {
                booking.status = status;
                booking.updated_at = now;
            }
        }
        for (seat_id, status) in seat_writes {
            if let Some(seat) = tables.seats.get_mut(&seat_id) {
                seat.status = status;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

/// Seat locks held in process memory, with TTL measured on the tokio clock.
#[derive(Clone, Default)]
pub struct InMemorySeatLocks {
    entries: Arc<Mutex<HashMap<SeatLockKey, (String, Instant)>>>,
    acquisitions: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemorySeatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys whose locks have not expired yet.
    pub async fn held_keys(&self) -> Vec<SeatLockKey> {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .iter()
            .filter(|(_, (_, expires_at))| *expires_at > now)
            .map(|(key, _)| *key)
            .collect()
    }

    /// Number of successful acquisitions since creation.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Simulate the lock service being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), LockError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("lock service unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl SeatLockService for InMemorySeatLocks {
    async fn try_acquire(&self, key: &SeatLockKey, owner: &str, ttl: Duration) -> Result<bool, LockError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(*key, (owner.to_string(), now + ttl));
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn release(&self, key: &SeatLockKey, owner: &str) -> Result<(), LockError> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|(holder, _)| holder == owner) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn peek(&self, key: &SeatLockKey) -> Result<Option<String>, LockError> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .await
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(owner, _)| owner.clone()))
    }
}

/// Collects published events for inspection.
#[derive(Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<BookingEvent>>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<BookingEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl BookingEventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
