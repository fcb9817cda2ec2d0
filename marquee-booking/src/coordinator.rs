use chrono::Utc;
use marquee_core::events::{BookingEvent, BookingEventPublisher};
use marquee_core::repository::{
    BookingRecords, BookingStorage, CatalogProvider, SeatLedger, StorageTransaction, StoreError,
};
use marquee_core::{
    Booking, BookingError, BookingStatus, CoreResult, Seat, SeatId, SeatLockKey, SeatLockService,
    SeatStatus, ShowtimeId, UserId, SEAT_LOCK_TTL,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::guard::SeatLockGuard;

/// Owns the booking and cancellation rules.
///
/// Seat contention is serialized by the distributed seat locks; the storage
/// transaction makes the ledger and booking writes of one call atomic.
pub struct BookingCoordinator {
    storage: Arc<dyn BookingStorage>,
    catalog: Arc<dyn CatalogProvider>,
    locks: Arc<dyn SeatLockService>,
    events: Arc<dyn BookingEventPublisher>,
    lock_ttl: Duration,
}

impl BookingCoordinator {
    pub fn new(
        storage: Arc<dyn BookingStorage>,
        catalog: Arc<dyn CatalogProvider>,
        locks: Arc<dyn SeatLockService>,
        events: Arc<dyn BookingEventPublisher>,
    ) -> Self {
        Self {
            storage,
            catalog,
            locks,
            events,
            lock_ttl: SEAT_LOCK_TTL,
        }
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Book every seat in `seat_ids` for `user_id`, or none of them.
    ///
    /// Every lock taken by this call is released before it returns, whatever
    /// the outcome.
    pub async fn create_booking(
        &self,
        user_id: UserId,
        showtime_id: ShowtimeId,
        seat_ids: &[SeatId],
    ) -> CoreResult<Booking> {
        validate_selection(seat_ids)?;

        let mut tx = self.storage.begin().await.map_err(storage_error)?;
        let mut guard = SeatLockGuard::new(self.locks.clone());

        let claimed = self
            .claim_seats(tx.as_mut(), &mut guard, user_id, showtime_id, seat_ids)
            .await;
        let result = match claimed {
            Ok(booking) => match tx.commit().await {
                Ok(()) => Ok(booking),
                Err(e) => {
                    error!("Commit failed for booking of showtime {}: {}", showtime_id, e);
                    Err(BookingError::CommitFailed(e.to_string()))
                }
            },
            Err(err) => {
                rollback(tx).await;
                Err(err)
            }
        };

        guard.release_all().await;

        match &result {
            Ok(booking) => {
                info!(
                    "Booking confirmed: {} (user {}, showtime {}, {} seats)",
                    booking.id,
                    user_id,
                    showtime_id,
                    booking.seats.len()
                );
                self.publish(BookingEvent::confirmed(booking)).await;
            }
            Err(err) => warn!("Booking rejected for user {} on showtime {}: {}", user_id, showtime_id, err),
        }

        result
    }

    async fn claim_seats(
        &self,
        tx: &mut dyn StorageTransaction,
        guard: &mut SeatLockGuard,
        user_id: UserId,
        showtime_id: ShowtimeId,
        seat_ids: &[SeatId],
    ) -> CoreResult<Booking> {
        let showtime = self
            .catalog
            .get_showtime(showtime_id)
            .await
            .map_err(storage_error)?
            .ok_or(BookingError::ShowtimeNotFound(showtime_id))?;

        if showtime.has_started(Utc::now()) {
            return Err(BookingError::ShowAlreadyStarted {
                showtime_id,
                start_time: showtime.start_time,
            });
        }

        // Caller order; acquisition never waits, so overlapping requests
        // cannot deadlock.
        let owner = user_id.to_string();
        for &seat_id in seat_ids {
            let key = SeatLockKey::new(showtime_id, seat_id);
            if !guard.try_acquire(key, &owner, self.lock_ttl).await? {
                let holder = self.current_holder(&key).await;
                return Err(BookingError::SeatLocked { seat_id, holder });
            }

            let seat = tx
                .seat_for_update(seat_id)
                .await
                .map_err(storage_error)?
                .ok_or(BookingError::SeatNotFound(seat_id))?;
            check_seat(&seat, showtime_id)?;
        }

        let booking = Booking::confirmed(user_id, showtime_id, seat_ids, showtime.price_minor).ok_or(
            BookingError::TotalOverflow {
                seats: seat_ids.len(),
                price_minor: showtime.price_minor,
            },
        )?;

        tx.insert_booking(&booking).await.map_err(storage_error)?;
        for line in &booking.seats {
            tx.update_seat_status(line.seat_id, SeatStatus::Booked)
                .await
                .map_err(storage_error)?;
        }

        Ok(booking)
    }

    async fn current_holder(&self, key: &SeatLockKey) -> Option<String> {
        match self.locks.peek(key).await {
            Ok(holder) => holder,
            Err(e) => {
                warn!("Could not read holder of {}: {}", key, e);
                None
            }
        }
    }

    /// Cancel a confirmed booking owned by `user_id` and free its seats.
    ///
    /// Takes no seat locks: the seats stay BOOKED, and so uncontended, until
    /// this transaction commits.
    pub async fn cancel_booking(&self, booking_id: Uuid, user_id: UserId) -> CoreResult<()> {
        let mut tx = self.storage.begin().await.map_err(storage_error)?;

        let released = release_booking(tx.as_mut(), booking_id, user_id).await;
        let booking = match released {
            Ok(booking) => booking,
            Err(err) => {
                rollback(tx).await;
                warn!("Cancellation of booking {} rejected: {}", booking_id, err);
                return Err(err);
            }
        };

        tx.commit().await.map_err(|e| {
            error!("Commit failed while cancelling booking {}: {}", booking_id, e);
            BookingError::CommitFailed(e.to_string())
        })?;

        info!("Booking cancelled: {} (user {})", booking_id, user_id);
        self.publish(BookingEvent::cancelled(&booking)).await;
        Ok(())
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.storage
            .get_booking(booking_id)
            .await
            .map_err(storage_error)?
            .ok_or(BookingError::BookingNotFound(booking_id))
    }

    pub async fn get_user_bookings(&self, user_id: UserId) -> CoreResult<Vec<Booking>> {
        self.storage.list_user_bookings(user_id).await.map_err(storage_error)
    }

    /// Seat ledger of one showtime.
    pub async fn get_showtime_seats(&self, showtime_id: ShowtimeId) -> CoreResult<Vec<Seat>> {
        self.catalog
            .get_showtime(showtime_id)
            .await
            .map_err(storage_error)?
            .ok_or(BookingError::ShowtimeNotFound(showtime_id))?;
        self.storage
            .list_showtime_seats(showtime_id)
            .await
            .map_err(storage_error)
    }

    async fn publish(&self, event: BookingEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!("Failed to publish {} for booking {}: {}", event.topic(), event.booking_id(), e);
        }
    }
}

async fn release_booking(
    tx: &mut dyn StorageTransaction,
    booking_id: Uuid,
    user_id: UserId,
) -> CoreResult<Booking> {
    let mut booking = tx
        .booking_for_update(booking_id)
        .await
        .map_err(storage_error)?
        .ok_or(BookingError::BookingNotFound(booking_id))?;

    if booking.user_id != user_id {
        return Err(BookingError::Unauthorized { booking_id, user_id });
    }
    if booking.is_cancelled() {
        return Err(BookingError::AlreadyCancelled(booking_id));
    }

    tx.update_booking_status(booking_id, BookingStatus::Cancelled)
        .await
        .map_err(storage_error)?;
    for line in &booking.seats {
        tx.update_seat_status(line.seat_id, SeatStatus::Available)
            .await
            .map_err(storage_error)?;
    }

    booking.status = BookingStatus::Cancelled;
    Ok(booking)
}

fn validate_selection(seat_ids: &[SeatId]) -> CoreResult<()> {
    if seat_ids.is_empty() {
        return Err(BookingError::EmptySeatSelection);
    }
    let mut seen = HashSet::with_capacity(seat_ids.len());
    for &seat_id in seat_ids {
        if !seen.insert(seat_id) {
            return Err(BookingError::DuplicateSeat(seat_id));
        }
    }
    Ok(())
}

fn check_seat(seat: &Seat, showtime_id: ShowtimeId) -> CoreResult<()> {
    if seat.showtime_id != showtime_id {
        return Err(BookingError::SeatShowtimeMismatch {
            seat_id: seat.id,
            expected: showtime_id,
            actual: seat.showtime_id,
        });
    }
    if seat.status != SeatStatus::Available {
        return Err(BookingError::SeatUnavailable {
            seat_id: seat.id,
            status: seat.status,
        });
    }
    Ok(())
}

async fn rollback(tx: Box<dyn StorageTransaction>) {
    if let Err(e) = tx.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}

fn storage_error(e: StoreError) -> BookingError {
    BookingError::Storage(e.to_string())
}
