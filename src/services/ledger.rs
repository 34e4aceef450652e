use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{BookingError, BookingResult};
use crate::models::{Booking, BookingId, BookingStatus, SeatNumber, ShowtimeId, UserId};
use crate::storage::{Cancellation, Store, StoreResult};

/// Журнал бронирований - аудиторский след того, кто держит какие места.
///
/// Записи только добавляются; отмена меняет статус существующей записи.
/// Запись и отмена доступны только движку резервирования: они выполняются
/// одной транзакцией с изменением вектора мест.
#[derive(Clone)]
pub struct BookingLedger {
    store: Arc<dyn Store>,
}

impl BookingLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub(crate) async fn append(&self, expected_version: i64, booking: &Booking) -> StoreResult<()> {
        self.store.commit_reservation(expected_version, booking).await
    }

    pub(crate) async fn mark_cancelled(&self, expected_version: i64, booking: &Booking) -> StoreResult<Booking> {
        let cancellation = Cancellation {
            booking_id: booking.id,
            showtime_id: booking.showtime_id,
            seats: booking.seats.clone(),
            cancelled_at: Utc::now(),
        };
        self.store.commit_cancellation(expected_version, &cancellation).await?;

        let mut cancelled = booking.clone();
        cancelled.status = BookingStatus::Cancelled;
        cancelled.cancelled_at = Some(cancellation.cancelled_at);
        Ok(cancelled)
    }

    pub async fn get(&self, booking_id: BookingId) -> BookingResult<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("booking {}", booking_id)))
    }

    pub async fn list_by_user(&self, user_id: &UserId) -> BookingResult<Vec<Booking>> {
        Ok(self.store.list_bookings_by_user(user_id).await?)
    }

    pub async fn list_by_showtime(&self, showtime_id: ShowtimeId) -> BookingResult<Vec<Booking>> {
        Ok(self.store.list_bookings_by_showtime(showtime_id).await?)
    }

    /// Занятые места по журналу: объединение мест подтверждённых броней.
    pub async fn booked_seats(&self, showtime_id: ShowtimeId) -> BookingResult<BTreeSet<SeatNumber>> {
        let bookings = self.list_by_showtime(showtime_id).await?;
        Ok(bookings
            .iter()
            .filter(|b| b.is_active())
            .flat_map(|b| b.seats.iter().copied())
            .collect())
    }
}
