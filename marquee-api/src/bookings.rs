use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use marquee_core::{Booking, SeatId, ShowtimeId};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub showtime_id: ShowtimeId,
    pub seat_ids: Vec<SeatId>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    debug!("User {} requests seats {:?} of showtime {}", user_id, req.seat_ids, req.showtime_id);

    let booking = state
        .coordinator
        .create_booking(user_id, req.showtime_id, &req.seat_ids)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state.coordinator.get_user_bookings(user_id).await?;
    Ok(Json(bookings))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.coordinator.get_booking(id).await?;

    if booking.user_id != user_id {
        return Err(AppError::AuthorizationError("Booking does not belong to you".to_string()));
    }

    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.coordinator.cancel_booking(id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
