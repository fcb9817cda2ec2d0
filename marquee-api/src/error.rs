use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use marquee_core::identity::AuthError;
use marquee_core::{BookingError, ErrorKind};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    Booking(BookingError),
}

impl AppError {
    fn status_for(kind: ErrorKind) -> StatusCode {
        match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::Booking(err) => {
                let kind = err.kind();
                let status = Self::status_for(kind);
                if kind == ErrorKind::Infrastructure {
                    tracing::error!("Booking infrastructure failure: {}", err);
                    (status, json!({ "error": "Service temporarily unavailable, retry later" }))
                } else {
                    let mut body = json!({ "error": err.to_string() });
                    if let Some(seat_id) = err.seat_id() {
                        body["seat_id"] = json!(seat_id);
                    }
                    (status, body)
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError::Booking(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::AuthenticationError(err.to_string())
    }
}
