use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type ShowtimeId = i64;
pub type SeatId = i64;
pub type UserId = i64;

/// A scheduled screening with a flat per-seat price (minor units).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Showtime {
    pub id: ShowtimeId,
    pub movie_id: i64,
    pub hall_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price_minor: i64,
}

impl Showtime {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Reserved,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Reserved => "RESERVED",
            SeatStatus::Booked => "BOOKED",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SeatStatus::Available),
            "RESERVED" => Ok(SeatStatus::Reserved),
            "BOOKED" => Ok(SeatStatus::Booked),
            other => Err(format!("unknown seat status: {}", other)),
        }
    }
}

/// A bookable position tied to exactly one showtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub id: SeatId,
    pub showtime_id: ShowtimeId,
    pub label: String,
    pub status: SeatStatus,
}

impl Seat {
    pub fn available(id: SeatId, showtime_id: ShowtimeId, label: impl Into<String>) -> Self {
        Self {
            id,
            showtime_id,
            label: label.into(),
            status: SeatStatus::Available,
        }
    }
}

/// Booking status. CONFIRMED moves to CANCELLED once and never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// A user's claim on one or more seats of a showtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: UserId,
    pub showtime_id: ShowtimeId,
    pub total_minor: i64,
    pub status: BookingStatus,
    pub seats: Vec<BookingSeat>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Build a confirmed booking with one line item per seat, all priced at
    /// `price_minor`. Returns `None` if the total overflows.
    pub fn confirmed(
        user_id: UserId,
        showtime_id: ShowtimeId,
        seat_ids: &[SeatId],
        price_minor: i64,
    ) -> Option<Self> {
        let count = i64::try_from(seat_ids.len()).ok()?;
        let total_minor = count.checked_mul(price_minor)?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        let seats = seat_ids
            .iter()
            .map(|&seat_id| BookingSeat::new(id, seat_id, price_minor))
            .collect();

        Some(Self {
            id,
            user_id,
            showtime_id,
            total_minor,
            status: BookingStatus::Confirmed,
            seats,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn seat_ids(&self) -> Vec<SeatId> {
        self.seats.iter().map(|line| line.seat_id).collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }
}

/// Line item: one seat at the price it was booked for. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingSeat {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub seat_id: SeatId,
    pub price_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl BookingSeat {
    pub fn new(booking_id: Uuid, seat_id: SeatId, price_minor: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            seat_id,
            price_minor,
            created_at: Utc::now(),
        }
    }
}
