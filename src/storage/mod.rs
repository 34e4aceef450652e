//! Хранилище залов, сеансов и журнала броней.
//!
//! Все изменения вектора мест идут через `commit_*` с ожидаемой версией сеанса
//! (compare-and-swap). Если версия уже ушла вперёд, хранилище возвращает
//! `StoreError::Conflict` и ничего не меняет: так несколько процессов могут
//! безопасно работать с одной базой.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Booking, BookingId, Room, RoomId, SeatNumber, Showtime, ShowtimeId, UserId,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Версия сеанса не совпала: кто-то зафиксировал изменения раньше.
    #[error("concurrent modification of showtime {0}")]
    Conflict(ShowtimeId),

    #[error("{0} not found")]
    Missing(String),

    /// В зале уже есть сеанс с тем же временем начала.
    #[error("another showtime in the room starts at {0}")]
    SlotTaken(DateTime<Utc>),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupted record: {0}")]
    Corrupted(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Отмена брони в рамках фиксации.
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub booking_id: BookingId,
    pub showtime_id: ShowtimeId,
    pub seats: Vec<SeatNumber>,
    pub cancelled_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // === Залы ===
    async fn insert_room(&self, room: &Room) -> StoreResult<()>;
    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>>;
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;

    // === Сеансы ===
    async fn insert_showtime(&self, showtime: &Showtime) -> StoreResult<()>;
    async fn get_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Option<Showtime>>;
    /// Сеансы зала, по времени начала.
    async fn list_showtimes_by_room(&self, room_id: RoomId) -> StoreResult<Vec<Showtime>>;
    async fn reschedule_showtime(
        &self,
        showtime_id: ShowtimeId,
        expected_version: i64,
        starts_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Удаляет сеанс, переводя все его подтверждённые брони в `cancelled`.
    /// Возвращает отменённые брони.
    async fn delete_showtime(
        &self,
        showtime_id: ShowtimeId,
        expected_version: i64,
        cancelled_at: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>>;

    // === Фиксация ===
    /// Атомарно: места брони -> booked, версия +1, запись брони в журнал.
    async fn commit_reservation(&self, expected_version: i64, booking: &Booking) -> StoreResult<()>;
    /// Атомарно: места -> available, версия +1, бронь -> cancelled.
    async fn commit_cancellation(&self, expected_version: i64, cancellation: &Cancellation) -> StoreResult<()>;

    // === Журнал ===
    async fn get_booking(&self, booking_id: BookingId) -> StoreResult<Option<Booking>>;
    async fn list_bookings_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Booking>>;
    async fn list_bookings_by_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Booking>>;
}
