//! Ошибки ядра бронирования и их отображение в HTTP-ответы.
//!
//! Классы ошибок:
//! - валидация (`UnknownSeat`, `DuplicateSeat`, `InvalidRequest`, `InvalidSchedule`) -
//!   ошибка клиента, повтор без изменения запроса бессмысленен;
//! - конкуренция (`SeatUnavailable`, `Busy`) - ожидаемы под нагрузкой, повторяемы;
//! - терминальные (`NotFound`, `Forbidden`, `HasActiveBookings`);
//! - `Internal` - сбой хранилища; попытка не оставила следов, повтор безопасен.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::room::join_seats;
use crate::models::SeatNumber;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("seats not in room layout: {}", join_seats(.0))]
    UnknownSeat(Vec<SeatNumber>),

    #[error("seats requested more than once: {}", join_seats(.0))]
    DuplicateSeat(Vec<SeatNumber>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("seats already booked: {}", join_seats(.conflicting_seats))]
    SeatUnavailable { conflicting_seats: Vec<SeatNumber> },

    #[error("showtime is busy, retry later")]
    Busy,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("showtime has active bookings")]
    HasActiveBookings,

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("internal error: {0}")]
    Internal(#[from] StoreError),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::UnknownSeat(_) => "UNKNOWN_SEAT",
            BookingError::DuplicateSeat(_) => "DUPLICATE_SEAT",
            BookingError::InvalidRequest(_) => "INVALID_REQUEST",
            BookingError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            BookingError::SeatUnavailable { .. } => "SEAT_UNAVAILABLE",
            BookingError::Busy => "BUSY",
            BookingError::Forbidden(_) => "FORBIDDEN",
            BookingError::HasActiveBookings => "HAS_ACTIVE_BOOKINGS",
            BookingError::Unauthenticated => "UNAUTHENTICATED",
            BookingError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Можно ли повторить запрос (для `SeatUnavailable` - с другими местами).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::SeatUnavailable { .. } | BookingError::Busy | BookingError::Internal(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::UnknownSeat(_)
            | BookingError::DuplicateSeat(_)
            | BookingError::InvalidRequest(_)
            | BookingError::InvalidSchedule(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::SeatUnavailable { .. } | BookingError::HasActiveBookings => StatusCode::CONFLICT,
            BookingError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
            BookingError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        BookingError::NotFound(what.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicting_seats: Option<Vec<SeatNumber>>,
    retryable: bool,
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Детали сбоя хранилища клиенту не отдаём, только в лог
        let message = match &self {
            BookingError::Internal(e) => {
                tracing::error!("storage failure: {:?}", e);
                "temporary storage failure, retry the request".to_string()
            }
            other => other.to_string(),
        };

        let conflicting_seats = match &self {
            BookingError::SeatUnavailable { conflicting_seats } => Some(conflicting_seats.clone()),
            _ => None,
        };

        let body = ErrorBody {
            code: self.code(),
            message,
            conflicting_seats,
            retryable: self.is_retryable(),
        };

        if matches!(self, BookingError::Busy) {
            return (status, [(header::RETRY_AFTER, "1")], Json(body)).into_response();
        }
        (status, Json(body)).into_response()
    }
}
