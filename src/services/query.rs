use std::sync::Arc;

use crate::error::{BookingError, BookingResult};
use crate::models::{Actor, Booking, BookingId, SeatNumber, SeatVector, ShowtimeId, UserId};
use crate::services::ledger::BookingLedger;
use crate::storage::Store;

/// Сторона чтения: статусы мест и брони. Ничего не меняет.
#[derive(Clone)]
pub struct BookingQueryService {
    store: Arc<dyn Store>,
    ledger: BookingLedger,
}

impl BookingQueryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { ledger: BookingLedger::new(store.clone()), store }
    }

    /// Снимок вектора мест, упорядоченный по номеру места.
    pub async fn seat_status(&self, showtime_id: ShowtimeId) -> BookingResult<SeatVector> {
        let showtime = self
            .store
            .get_showtime(showtime_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("showtime {}", showtime_id)))?;
        Ok(showtime.seats)
    }

    pub async fn available_seats(&self, showtime_id: ShowtimeId) -> BookingResult<Vec<SeatNumber>> {
        Ok(self.seat_status(showtime_id).await?.available())
    }

    pub async fn bookings_for_user(&self, user_id: &UserId) -> BookingResult<Vec<Booking>> {
        self.ledger.list_by_user(user_id).await
    }

    pub async fn bookings_for_showtime(&self, showtime_id: ShowtimeId) -> BookingResult<Vec<Booking>> {
        self.ledger.list_by_showtime(showtime_id).await
    }

    /// Бронь видна владельцу и администратору.
    pub async fn booking(&self, booking_id: BookingId, actor: &Actor) -> BookingResult<Booking> {
        let booking = self.ledger.get(booking_id).await?;
        if !actor.may_act_for(booking.user_id.as_ref()) {
            return Err(BookingError::Forbidden(format!("booking {} is not visible to {}", booking_id, actor.user_id)));
        }
        Ok(booking)
    }
}
