use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};
use marquee_core::{Seat, ShowtimeId};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/showtimes/{id}/seats", get(list_seats))
}

async fn list_seats(
    State(state): State<AppState>,
    Path(showtime_id): Path<ShowtimeId>,
) -> Result<Json<Vec<Seat>>, AppError> {
    let seats = state.coordinator.get_showtime_seats(showtime_id).await?;
    Ok(Json(seats))
}
