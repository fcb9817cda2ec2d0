use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use marquee_booking::BookingCoordinator;
use marquee_core::events::{BookingEvent, BookingEventPublisher};
use marquee_core::memory::{InMemorySeatLocks, InMemoryStorage, RecordingEventPublisher};
use marquee_core::{
    BookingError, BookingStatus, ErrorKind, Seat, SeatLockKey, SeatLockService, SeatStatus, Showtime,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const SHOWTIME: i64 = 1;
const STARTED_SHOWTIME: i64 = 2;
const OTHER_SHOWTIME: i64 = 3;
const A1: i64 = 11;
const A2: i64 = 12;
const A3: i64 = 13;
const PAST_SEAT: i64 = 21;
const FOREIGN_SEAT: i64 = 31;

struct Fixture {
    storage: InMemoryStorage,
    locks: InMemorySeatLocks,
    events: RecordingEventPublisher,
    coordinator: BookingCoordinator,
}

fn showtime(id: i64, starts_in: ChronoDuration) -> Showtime {
    let start_time = Utc::now() + starts_in;
    Showtime {
        id,
        movie_id: 1,
        hall_id: 1,
        start_time,
        end_time: start_time + ChronoDuration::hours(2),
        price_minor: 1000,
    }
}

async fn fixture_with(events: Arc<dyn BookingEventPublisher>) -> Fixture {
    let storage = InMemoryStorage::new();
    storage.insert_showtime(showtime(SHOWTIME, ChronoDuration::hours(2))).await;
    storage.insert_showtime(showtime(STARTED_SHOWTIME, ChronoDuration::minutes(-5))).await;
    storage.insert_showtime(showtime(OTHER_SHOWTIME, ChronoDuration::hours(4))).await;
    storage.insert_seat(Seat::available(A1, SHOWTIME, "A1")).await;
    storage.insert_seat(Seat::available(A2, SHOWTIME, "A2")).await;
    storage.insert_seat(Seat::available(A3, SHOWTIME, "A3")).await;
    storage.insert_seat(Seat::available(PAST_SEAT, STARTED_SHOWTIME, "A1")).await;
    storage.insert_seat(Seat::available(FOREIGN_SEAT, OTHER_SHOWTIME, "A1")).await;

    let locks = InMemorySeatLocks::new();
    let coordinator = BookingCoordinator::new(
        Arc::new(storage.clone()),
        Arc::new(storage.clone()),
        Arc::new(locks.clone()),
        events,
    );

    Fixture {
        storage,
        locks,
        events: RecordingEventPublisher::new(),
        coordinator,
    }
}

async fn fixture() -> Fixture {
    let events = RecordingEventPublisher::new();
    let mut fx = fixture_with(Arc::new(events.clone())).await;
    fx.events = events;
    fx
}

impl Fixture {
    async fn status(&self, seat_id: i64) -> SeatStatus {
        self.storage.seat(seat_id).await.unwrap().status
    }
}

#[tokio::test]
async fn test_booking_then_overlapping_request_is_all_or_nothing() {
    let fx = fixture().await;

    let booking = fx.coordinator.create_booking(1, SHOWTIME, &[A1, A2]).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.total_minor, 2000);
    assert_eq!(booking.seat_ids(), vec![A1, A2]);
    assert_eq!(fx.status(A1).await, SeatStatus::Booked);
    assert_eq!(fx.status(A2).await, SeatStatus::Booked);

    let err = fx.coordinator.create_booking(2, SHOWTIME, &[A2, A3]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.seat_id(), Some(A2));
    assert_eq!(fx.status(A3).await, SeatStatus::Available);

    assert_eq!(fx.storage.booking_count().await, 1);
    assert!(fx.locks.held_keys().await.is_empty());
}

#[tokio::test]
async fn test_started_showtime_takes_no_locks() {
    let fx = fixture().await;

    let err = fx.coordinator.create_booking(1, STARTED_SHOWTIME, &[PAST_SEAT]).await.unwrap_err();

    assert!(matches!(err, BookingError::ShowAlreadyStarted { showtime_id: STARTED_SHOWTIME, .. }));
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert_eq!(fx.locks.acquisitions(), 0);
    assert_eq!(fx.status(PAST_SEAT).await, SeatStatus::Available);
}

#[tokio::test]
async fn test_unknown_showtime() {
    let fx = fixture().await;

    let err = fx.coordinator.create_booking(1, 404, &[A1]).await.unwrap_err();

    assert!(matches!(err, BookingError::ShowtimeNotFound(404)));
    assert_eq!(fx.locks.acquisitions(), 0);
}

#[tokio::test]
async fn test_seat_held_elsewhere_names_holder_and_keeps_foreign_lock() {
    let fx = fixture().await;
    let contested = SeatLockKey::new(SHOWTIME, A2);
    assert!(fx.locks.try_acquire(&contested, "99", Duration::from_secs(300)).await.unwrap());

    let err = fx.coordinator.create_booking(1, SHOWTIME, &[A1, A2, A3]).await.unwrap_err();

    match err {
        BookingError::SeatLocked { seat_id, holder } => {
            assert_eq!(seat_id, A2);
            assert_eq!(holder.as_deref(), Some("99"));
        }
        other => panic!("expected SeatLocked, got {:?}", other),
    }
    // A1 was acquired and released by the losing call; the winner keeps A2.
    assert_eq!(fx.locks.held_keys().await, vec![contested]);
    assert_eq!(fx.status(A1).await, SeatStatus::Available);
    assert_eq!(fx.storage.booking_count().await, 0);
}

#[tokio::test]
async fn test_missing_seat_rolls_back_earlier_seats() {
    let fx = fixture().await;

    let err = fx.coordinator.create_booking(1, SHOWTIME, &[A1, 999]).await.unwrap_err();

    assert!(matches!(err, BookingError::SeatNotFound(999)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fx.status(A1).await, SeatStatus::Available);
    assert!(fx.locks.held_keys().await.is_empty());
    assert_eq!(fx.storage.booking_count().await, 0);
}

#[tokio::test]
async fn test_seat_from_another_showtime() {
    let fx = fixture().await;

    let err = fx.coordinator.create_booking(1, SHOWTIME, &[A1, FOREIGN_SEAT]).await.unwrap_err();

    assert!(matches!(
        err,
        BookingError::SeatShowtimeMismatch { seat_id: FOREIGN_SEAT, expected: SHOWTIME, actual: OTHER_SHOWTIME }
    ));
    assert_eq!(fx.status(A1).await, SeatStatus::Available);
    assert_eq!(fx.status(FOREIGN_SEAT).await, SeatStatus::Available);
}

#[tokio::test]
async fn test_invalid_selection_is_rejected_before_locking() {
    let fx = fixture().await;

    let empty = fx.coordinator.create_booking(1, SHOWTIME, &[]).await.unwrap_err();
    assert!(matches!(empty, BookingError::EmptySeatSelection));

    let duplicate = fx.coordinator.create_booking(1, SHOWTIME, &[A1, A2, A1]).await.unwrap_err();
    assert!(matches!(duplicate, BookingError::DuplicateSeat(A1)));
    assert_eq!(duplicate.kind(), ErrorKind::InvalidInput);

    assert_eq!(fx.locks.acquisitions(), 0);
}

#[tokio::test]
async fn test_commit_failure_leaves_ledger_untouched_and_is_retryable() {
    let fx = fixture().await;
    fx.storage.fail_next_commit();

    let err = fx.coordinator.create_booking(1, SHOWTIME, &[A1, A2]).await.unwrap_err();

    assert!(matches!(err, BookingError::CommitFailed(_)));
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert_eq!(fx.status(A1).await, SeatStatus::Available);
    assert_eq!(fx.storage.booking_count().await, 0);
    assert!(fx.locks.held_keys().await.is_empty());
    assert!(fx.events.events().await.is_empty());

    let booking = fx.coordinator.create_booking(1, SHOWTIME, &[A1, A2]).await.unwrap();
    assert_eq!(booking.total_minor, 2000);
}

#[tokio::test]
async fn test_lock_service_outage_is_infrastructure_failure() {
    let fx = fixture().await;
    fx.locks.set_unavailable(true);

    let err = fx.coordinator.create_booking(1, SHOWTIME, &[A1]).await.unwrap_err();

    assert!(matches!(err, BookingError::LockService(_)));
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert_eq!(fx.status(A1).await, SeatStatus::Available);
}

#[tokio::test]
async fn test_cancel_frees_seats_for_another_user() {
    let fx = fixture().await;
    let booking = fx.coordinator.create_booking(1, SHOWTIME, &[A1, A2]).await.unwrap();

    fx.coordinator.cancel_booking(booking.id, 1).await.unwrap();

    assert_eq!(fx.status(A1).await, SeatStatus::Available);
    assert_eq!(fx.status(A2).await, SeatStatus::Available);
    let cancelled = fx.coordinator.get_booking(booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let rebooked = fx.coordinator.create_booking(2, SHOWTIME, &[A1, A2]).await.unwrap();
    assert_eq!(rebooked.user_id, 2);
    assert_eq!(fx.status(A2).await, SeatStatus::Booked);
}

#[tokio::test]
async fn test_cancel_twice_is_rejected_without_mutation() {
    let fx = fixture().await;
    let booking = fx.coordinator.create_booking(1, SHOWTIME, &[A1]).await.unwrap();
    fx.coordinator.cancel_booking(booking.id, 1).await.unwrap();
    fx.coordinator.create_booking(2, SHOWTIME, &[A1]).await.unwrap();

    let err = fx.coordinator.cancel_booking(booking.id, 1).await.unwrap_err();

    assert!(matches!(err, BookingError::AlreadyCancelled(id) if id == booking.id));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    // The second user's booking of A1 is untouched.
    assert_eq!(fx.status(A1).await, SeatStatus::Booked);
    assert_eq!(fx.events.events().await.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_cancellations_cancel_once() {
    let fx = fixture().await;

    for round in 0..10 {
        let booking = fx.coordinator.create_booking(1, SHOWTIME, &[A1]).await.unwrap();

        let (first, second) = tokio::join!(
            fx.coordinator.cancel_booking(booking.id, 1),
            fx.coordinator.cancel_booking(booking.id, 1),
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1, "round {}", round);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(BookingError::AlreadyCancelled(id)) if *id == booking.id)));

        // The seat now belongs to someone else; no late cancel may free it.
        let rebooked = fx.coordinator.create_booking(2, SHOWTIME, &[A1]).await.unwrap();
        let err = fx.coordinator.cancel_booking(booking.id, 1).await.unwrap_err();
        assert!(matches!(err, BookingError::AlreadyCancelled(_)));
        assert_eq!(fx.status(A1).await, SeatStatus::Booked);

        fx.coordinator.cancel_booking(rebooked.id, 2).await.unwrap();
    }

    let cancellations = fx
        .events
        .events()
        .await
        .into_iter()
        .filter(|e| matches!(e, BookingEvent::Cancelled { .. }))
        .count();
    assert_eq!(cancellations, 20);
}

#[tokio::test]
async fn test_cancel_requires_owner() {
    let fx = fixture().await;
    let booking = fx.coordinator.create_booking(1, SHOWTIME, &[A1]).await.unwrap();

    let err = fx.coordinator.cancel_booking(booking.id, 2).await.unwrap_err();

    assert!(matches!(err, BookingError::Unauthorized { user_id: 2, .. }));
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(fx.status(A1).await, SeatStatus::Booked);
    assert_eq!(fx.coordinator.get_booking(booking.id).await.unwrap().status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn test_cancel_unknown_booking() {
    let fx = fixture().await;
    let id = Uuid::new_v4();

    let err = fx.coordinator.cancel_booking(id, 1).await.unwrap_err();

    assert!(matches!(err, BookingError::BookingNotFound(missing) if missing == id));
}

#[tokio::test]
async fn test_events_follow_commits() {
    let fx = fixture().await;
    let booking = fx.coordinator.create_booking(1, SHOWTIME, &[A1, A2]).await.unwrap();
    fx.coordinator.cancel_booking(booking.id, 1).await.unwrap();

    let events = fx.events.events().await;
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], BookingEvent::Confirmed { total_minor: 2000, .. }));
    assert!(matches!(&events[1], BookingEvent::Cancelled { seat_ids, .. } if seat_ids == &vec![A1, A2]));
}

struct FailingPublisher;

#[async_trait]
impl BookingEventPublisher for FailingPublisher {
    async fn publish(&self, _event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("broker unreachable".into())
    }
}

#[tokio::test]
async fn test_publish_failure_does_not_undo_booking() {
    let fx = fixture_with(Arc::new(FailingPublisher)).await;

    let booking = fx.coordinator.create_booking(1, SHOWTIME, &[A1]).await.unwrap();

    assert_eq!(fx.status(A1).await, SeatStatus::Booked);
    assert_eq!(fx.coordinator.get_booking(booking.id).await.unwrap().id, booking.id);
}

#[tokio::test]
async fn test_read_projections() {
    let fx = fixture().await;
    let first = fx.coordinator.create_booking(1, SHOWTIME, &[A1]).await.unwrap();
    let second = fx.coordinator.create_booking(1, SHOWTIME, &[A2]).await.unwrap();
    fx.coordinator.create_booking(2, SHOWTIME, &[A3]).await.unwrap();

    let mine = fx.coordinator.get_user_bookings(1).await.unwrap();
    let ids: Vec<Uuid> = mine.iter().map(|b| b.id).collect();
    assert_eq!(mine.len(), 2);
    assert!(ids.contains(&first.id) && ids.contains(&second.id));

    let seats = fx.coordinator.get_showtime_seats(SHOWTIME).await.unwrap();
    assert_eq!(seats.len(), 3);
    assert!(seats.iter().all(|seat| seat.status == SeatStatus::Booked));

    assert!(matches!(
        fx.coordinator.get_showtime_seats(404).await,
        Err(BookingError::ShowtimeNotFound(404))
    ));
    assert!(matches!(
        fx.coordinator.get_booking(Uuid::new_v4()).await,
        Err(BookingError::BookingNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_lock_left_by_crashed_holder_expires() {
    let fx = fixture().await;
    let stale = SeatLockKey::new(SHOWTIME, A1);
    fx.locks.try_acquire(&stale, "7", Duration::from_secs(300)).await.unwrap();

    let err = fx.coordinator.create_booking(1, SHOWTIME, &[A1]).await.unwrap_err();
    assert!(matches!(err, BookingError::SeatLocked { seat_id: A1, .. }));

    tokio::time::advance(Duration::from_secs(301)).await;

    fx.coordinator.create_booking(1, SHOWTIME, &[A1]).await.unwrap();
    assert_eq!(fx.status(A1).await, SeatStatus::Booked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overlapping_requests_have_one_winner() {
    for _ in 0..25 {
        let fx = fixture().await;
        let coordinator = Arc::new(fx.coordinator);

        let left = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.create_booking(1, SHOWTIME, &[A1, A2]).await })
        };
        let right = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.create_booking(2, SHOWTIME, &[A2, A3]).await })
        };

        let left = left.await.unwrap();
        let right = right.await.unwrap();

        let winners = [left.is_ok(), right.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1);

        match (&left, &right) {
            (Ok(_), Err(err)) => {
                assert_eq!(err.kind(), ErrorKind::Conflict);
                assert_eq!(fx.storage.seat(A3).await.unwrap().status, SeatStatus::Available);
            }
            (Err(err), Ok(_)) => {
                assert_eq!(err.kind(), ErrorKind::Conflict);
                assert_eq!(fx.storage.seat(A1).await.unwrap().status, SeatStatus::Available);
            }
            _ => unreachable!(),
        }

        assert_eq!(fx.storage.booking_count().await, 1);
        assert!(fx.locks.held_keys().await.is_empty());
    }
}
