use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Booking, SeatId, ShowtimeId, UserId};

pub const BOOKING_CONFIRMED_TOPIC: &str = "booking.confirmed";
pub const BOOKING_CANCELLED_TOPIC: &str = "booking.cancelled";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    Confirmed {
        booking_id: Uuid,
        user_id: UserId,
        showtime_id: ShowtimeId,
        seat_ids: Vec<SeatId>,
        total_minor: i64,
        occurred_at: i64,
    },
    Cancelled {
        booking_id: Uuid,
        user_id: UserId,
        showtime_id: ShowtimeId,
        seat_ids: Vec<SeatId>,
        occurred_at: i64,
    },
}

impl BookingEvent {
    pub fn confirmed(booking: &Booking) -> Self {
        BookingEvent::Confirmed {
            booking_id: booking.id,
            user_id: booking.user_id,
            showtime_id: booking.showtime_id,
            seat_ids: booking.seat_ids(),
            total_minor: booking.total_minor,
            occurred_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn cancelled(booking: &Booking) -> Self {
        BookingEvent::Cancelled {
            booking_id: booking.id,
            user_id: booking.user_id,
            showtime_id: booking.showtime_id,
            seat_ids: booking.seat_ids(),
            occurred_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            BookingEvent::Confirmed { .. } => BOOKING_CONFIRMED_TOPIC,
            BookingEvent::Cancelled { .. } => BOOKING_CANCELLED_TOPIC,
        }
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            BookingEvent::Confirmed { booking_id, .. } | BookingEvent::Cancelled { booking_id, .. } => {
                *booking_id
            }
        }
    }
}

#[async_trait]
pub trait BookingEventPublisher: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Publisher for deployments without a broker.
pub struct NoopEventPublisher;

#[async_trait]
impl BookingEventPublisher for NoopEventPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!("Dropping {} event for booking {}", event.topic(), event.booking_id());
        Ok(())
    }
}
