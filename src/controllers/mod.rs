pub mod bookings;
pub mod rooms;
pub mod showtimes;

use axum::Router;
use std::sync::Arc;
use validator::Validate;

use crate::error::BookingError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(rooms::routes())
        .merge(showtimes::routes())
        .merge(bookings::routes())
}

/// Проверка тела запроса по аннотациям `validator`.
pub(crate) fn validated<T: Validate>(req: T) -> Result<T, BookingError> {
    req.validate()
        .map_err(|e| BookingError::InvalidRequest(e.to_string().replace('\n', "; ")))?;
    Ok(req)
}
