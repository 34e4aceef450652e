#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use seat_booking::config::{BookingConfig, Config};
use seat_booking::models::{Booking, BookingId, MovieId, Room, RoomId, Seat, Showtime, ShowtimeId, UserId};
use seat_booking::storage::{Cancellation, InMemoryStore, Store, StoreError, StoreResult};
use seat_booking::AppState;

/// Состояние приложения поверх хранилища в памяти.
pub fn state(booking: BookingConfig) -> Arc<AppState> {
    AppState::with_store(Config::local(booking), Arc::new(InMemoryStore::new()))
}

/// Зал с местами `1..=seats` и один сеанс в нём.
pub async fn room_with_showtime(state: &AppState, seats: i32) -> (RoomId, ShowtimeId) {
    let room = state
        .seat_map
        .add_room("Main", (1..=seats).map(Seat::standard).collect())
        .await
        .unwrap();
    let showtime = state
        .registry
        .create(room.id, MovieId::new(), Utc::now() + chrono::Duration::days(1))
        .await
        .unwrap();
    (room.id, showtime)
}

/// Хранилище, у которого можно «выключить» фиксацию или заставить её
/// проигрывать CAS, как будто в ту же базу пишет другой экземпляр сервиса.
#[derive(Default)]
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    fail_commits: AtomicBool,
    losses: AtomicUsize,
    commit_attempts: AtomicUsize,
    rival: Mutex<Option<BoxFuture<'static, ()>>>,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail_commits.store(failing, Ordering::SeqCst);
    }

    /// Следующие `n` фиксаций вернут `Conflict`.
    pub fn lose_next(&self, n: usize) {
        self.losses.store(n, Ordering::SeqCst);
    }

    /// Следующая фиксация проиграет: сначала выполнится `rival`, потом `Conflict`.
    pub fn lose_to(&self, rival: impl Future<Output = ()> + Send + 'static) {
        *self.rival.lock().unwrap() = Some(Box::pin(rival));
    }

    pub fn commit_attempts(&self) -> usize {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    /// То же хранилище без подмен, для второго экземпляра сервиса.
    pub fn shared(&self) -> Arc<InMemoryStore> {
        self.inner.clone()
    }

    async fn contend(&self, showtime_id: ShowtimeId) -> StoreResult<()> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);

        let rival = self.rival.lock().unwrap().take();
        if let Some(rival) = rival {
            rival.await;
            return Err(StoreError::Conflict(showtime_id));
        }
        if self.losses.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(StoreError::Conflict(showtime_id));
        }
        Ok(())
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_room(&self, room: &Room) -> StoreResult<()> {
        self.inner.insert_room(room).await
    }

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>> {
        self.inner.get_room(room_id).await
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        self.inner.list_rooms().await
    }

    async fn insert_showtime(&self, showtime: &Showtime) -> StoreResult<()> {
        self.inner.insert_showtime(showtime).await
    }

    async fn get_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Option<Showtime>> {
        self.inner.get_showtime(showtime_id).await
    }

    async fn list_showtimes_by_room(&self, room_id: RoomId) -> StoreResult<Vec<Showtime>> {
        self.inner.list_showtimes_by_room(room_id).await
    }

    async fn reschedule_showtime(
        &self,
        showtime_id: ShowtimeId,
        expected_version: i64,
        starts_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner.reschedule_showtime(showtime_id, expected_version, starts_at).await
    }

    async fn delete_showtime(
        &self,
        showtime_id: ShowtimeId,
        expected_version: i64,
        cancelled_at: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>> {
        self.check()?;
        self.inner.delete_showtime(showtime_id, expected_version, cancelled_at).await
    }

    async fn commit_reservation(&self, expected_version: i64, booking: &Booking) -> StoreResult<()> {
        self.check()?;
        self.contend(booking.showtime_id).await?;
        self.inner.commit_reservation(expected_version, booking).await
    }

    async fn commit_cancellation(&self, expected_version: i64, cancellation: &Cancellation) -> StoreResult<()> {
        self.check()?;
        self.contend(cancellation.showtime_id).await?;
        self.inner.commit_cancellation(expected_version, cancellation).await
    }

    async fn get_booking(&self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        self.inner.get_booking(booking_id).await
    }

    async fn list_bookings_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Booking>> {
        self.inner.list_bookings_by_user(user_id).await
    }

    async fn list_bookings_by_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Booking>> {
        self.inner.list_bookings_by_showtime(showtime_id).await
    }
}
