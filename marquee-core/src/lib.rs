pub mod events;
pub mod identity;
pub mod lock;
pub mod memory;
pub mod models;
pub mod repository;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use models::{Booking, BookingSeat, BookingStatus, Seat, SeatId, SeatStatus, Showtime, ShowtimeId, UserId};
pub use lock::{SeatLockKey, SeatLockService, SEAT_LOCK_TTL};

/// Coarse classification of a [`BookingError`], used by callers to pick a
/// response without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    PreconditionFailed,
    InvalidInput,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("No seats were requested")]
    EmptySeatSelection,
    #[error("Seat {0} was requested more than once")]
    DuplicateSeat(SeatId),
    #[error("Total for {seats} seats at {price_minor} overflows")]
    TotalOverflow { seats: usize, price_minor: i64 },
    #[error("Showtime not found: {0}")]
    ShowtimeNotFound(ShowtimeId),
    #[error("Cannot book seats for showtime {showtime_id}: it started at {start_time}")]
    ShowAlreadyStarted {
        showtime_id: ShowtimeId,
        start_time: DateTime<Utc>,
    },
    #[error("Seat {seat_id} is currently being booked{}", holder_suffix(.holder))]
    SeatLocked {
        seat_id: SeatId,
        holder: Option<String>,
    },
    #[error("Seat not found: {0}")]
    SeatNotFound(SeatId),
    #[error("Seat {seat_id} belongs to showtime {actual}, not {expected}")]
    SeatShowtimeMismatch {
        seat_id: SeatId,
        expected: ShowtimeId,
        actual: ShowtimeId,
    },
    #[error("Seat {seat_id} is not available (current status: {status})")]
    SeatUnavailable { seat_id: SeatId, status: SeatStatus },
    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),
    #[error("User {user_id} is not allowed to modify booking {booking_id}")]
    Unauthorized { booking_id: Uuid, user_id: UserId },
    #[error("Booking {0} is already cancelled")]
    AlreadyCancelled(Uuid),
    #[error("Lock service error: {0}")]
    LockService(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Commit failed: {0}")]
    CommitFailed(String),
}

fn holder_suffix(holder: &Option<String>) -> String {
    match holder {
        Some(user) => format!(" by user {}", user),
        None => String::new(),
    }
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::EmptySeatSelection
            | BookingError::DuplicateSeat(_)
            | BookingError::TotalOverflow { .. } => ErrorKind::InvalidInput,
            BookingError::ShowtimeNotFound(_)
            | BookingError::SeatNotFound(_)
            | BookingError::BookingNotFound(_) => ErrorKind::NotFound,
            BookingError::SeatLocked { .. }
            | BookingError::SeatShowtimeMismatch { .. }
            | BookingError::SeatUnavailable { .. }
            | BookingError::AlreadyCancelled(_) => ErrorKind::Conflict,
            BookingError::Unauthorized { .. } => ErrorKind::Forbidden,
            BookingError::ShowAlreadyStarted { .. } => ErrorKind::PreconditionFailed,
            BookingError::LockService(_)
            | BookingError::Storage(_)
            | BookingError::CommitFailed(_) => ErrorKind::Infrastructure,
        }
    }

    /// The seat this error is about, if any.
    pub fn seat_id(&self) -> Option<SeatId> {
        match self {
            BookingError::DuplicateSeat(seat_id)
            | BookingError::SeatNotFound(seat_id)
            | BookingError::SeatLocked { seat_id, .. }
            | BookingError::SeatShowtimeMismatch { seat_id, .. }
            | BookingError::SeatUnavailable { seat_id, .. } => Some(*seat_id),
            _ => None,
        }
    }
}

pub type CoreResult<T> = Result<T, BookingError>;
