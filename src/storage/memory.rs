use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Cancellation, Store, StoreError, StoreResult};
use crate::models::{
    Booking, BookingId, BookingStatus, Room, RoomId, SeatStatus, Showtime, ShowtimeId, UserId,
};

/// Хранилище в памяти процесса. Используется, когда DATABASE_URL не задан, и в тестах.
///
/// Внутренний `RwLock` защищает только структуры данных и не удерживается
/// через `.await`; взаимоисключение по сеансам обеспечивает движок.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<RoomId, Room>,
    room_order: Vec<RoomId>,
    showtimes: HashMap<ShowtimeId, Showtime>,
    bookings: HashMap<BookingId, Booking>,
    // порядок добавления в журнал
    journal: Vec<BookingId>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn showtime_for_commit(&mut self, showtime_id: ShowtimeId, expected_version: i64) -> StoreResult<&mut Showtime> {
        let showtime = self
            .showtimes
            .get_mut(&showtime_id)
            .ok_or_else(|| StoreError::Missing(format!("showtime {}", showtime_id)))?;
        if showtime.version != expected_version {
            return Err(StoreError::Conflict(showtime_id));
        }
        Ok(showtime)
    }

    fn slot_taken(&self, room_id: RoomId, starts_at: DateTime<Utc>, except: ShowtimeId) -> bool {
        self.showtimes
            .values()
            .any(|s| s.id != except && s.room_id == room_id && s.starts_at == starts_at)
    }

    fn bookings_where(&self, pred: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        // новые брони первыми
        self.journal
            .iter()
            .rev()
            .filter_map(|id| self.bookings.get(id))
            .filter(|b| pred(*b))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_room(&self, room: &Room) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.rooms.insert(room.id, room.clone()).is_none() {
            inner.room_order.push(room.id);
        }
        Ok(())
    }

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>> {
        Ok(self.inner.read().await.rooms.get(&room_id).cloned())
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let inner = self.inner.read().await;
        Ok(inner.room_order.iter().filter_map(|id| inner.rooms.get(id)).cloned().collect())
    }

    async fn insert_showtime(&self, showtime: &Showtime) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.rooms.contains_key(&showtime.room_id) {
            return Err(StoreError::Missing(format!("room {}", showtime.room_id)));
        }
        if inner.slot_taken(showtime.room_id, showtime.starts_at, showtime.id) {
            return Err(StoreError::SlotTaken(showtime.starts_at));
        }
        inner.showtimes.insert(showtime.id, showtime.clone());
        Ok(())
    }

    async fn get_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Option<Showtime>> {
        Ok(self.inner.read().await.showtimes.get(&showtime_id).cloned())
    }

    async fn list_showtimes_by_room(&self, room_id: RoomId) -> StoreResult<Vec<Showtime>> {
        let inner = self.inner.read().await;
        let mut showtimes: Vec<Showtime> = inner
            .showtimes
            .values()
            .filter(|s| s.room_id == room_id)
            .cloned()
            .collect();
        showtimes.sort_by_key(|s| s.starts_at);
        Ok(showtimes)
    }

    async fn reschedule_showtime(
        &self,
        showtime_id: ShowtimeId,
        expected_version: i64,
        starts_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let room_id = inner.showtime_for_commit(showtime_id, expected_version)?.room_id;
        if inner.slot_taken(room_id, starts_at, showtime_id) {
            return Err(StoreError::SlotTaken(starts_at));
        }
        let showtime = inner.showtime_for_commit(showtime_id, expected_version)?;
        showtime.starts_at = starts_at;
        showtime.version += 1;
        Ok(())
    }

    async fn delete_showtime(
        &self,
        showtime_id: ShowtimeId,
        expected_version: i64,
        cancelled_at: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>> {
        let mut inner = self.inner.write().await;
        inner.showtime_for_commit(showtime_id, expected_version)?;
        inner.showtimes.remove(&showtime_id);

        let mut cancelled = Vec::new();
        for booking in inner.bookings.values_mut() {
            if booking.showtime_id == showtime_id && booking.is_active() {
                booking.status = BookingStatus::Cancelled;
                booking.cancelled_at = Some(cancelled_at);
                cancelled.push(booking.clone());
            }
        }
        cancelled.sort_by_key(|b| b.created_at);
        Ok(cancelled)
    }

    async fn commit_reservation(&self, expected_version: i64, booking: &Booking) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.bookings.contains_key(&booking.id) {
            return Err(StoreError::Corrupted(format!("booking {} already recorded", booking.id)));
        }

        let showtime = inner.showtime_for_commit(booking.showtime_id, expected_version)?;
        // условное обновление: все места должны быть свободны на момент записи
        let all_free = booking
            .seats
            .iter()
            .all(|seat| showtime.seats.status(*seat) == Some(SeatStatus::Available));
        if !all_free {
            return Err(StoreError::Conflict(booking.showtime_id));
        }
        showtime.seats = showtime.seats.with_status(&booking.seats, SeatStatus::Booked);
        showtime.version += 1;

        inner.bookings.insert(booking.id, booking.clone());
        inner.journal.push(booking.id);
        Ok(())
    }

    async fn commit_cancellation(&self, expected_version: i64, cancellation: &Cancellation) -> StoreResult<()> {
        let mut inner = self.inner.write().await;

        match inner.bookings.get(&cancellation.booking_id) {
            Some(b) if b.is_active() => {}
            Some(_) => return Err(StoreError::Conflict(cancellation.showtime_id)),
            None => return Err(StoreError::Missing(format!("booking {}", cancellation.booking_id))),
        }

        let showtime = inner.showtime_for_commit(cancellation.showtime_id, expected_version)?;
        showtime.seats = showtime.seats.with_status(&cancellation.seats, SeatStatus::Available);
        showtime.version += 1;

        if let Some(booking) = inner.bookings.get_mut(&cancellation.booking_id) {
            booking.status = BookingStatus::Cancelled;
            booking.cancelled_at = Some(cancellation.cancelled_at);
        }
        Ok(())
    }

    async fn get_booking(&self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.inner.read().await.bookings.get(&booking_id).cloned())
    }

    async fn list_bookings_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Booking>> {
        let inner = self.inner.read().await;
        Ok(inner.bookings_where(|b| b.user_id.as_ref() == Some(user_id)))
    }

    async fn list_bookings_by_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Booking>> {
        let inner = self.inner.read().await;
        Ok(inner.bookings_where(|b| b.showtime_id == showtime_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovieId, Seat, SeatNumber};

    async fn seeded() -> (InMemoryStore, Showtime) {
        let store = InMemoryStore::new();
        let room = Room::new("Hall", vec![Seat::standard(1), Seat::standard(2)]).unwrap();
        store.insert_room(&room).await.unwrap();
        let showtime = Showtime::new(room.id, MovieId::new(), Utc::now(), &room.seat_numbers());
        store.insert_showtime(&showtime).await.unwrap();
        (store, showtime)
    }

    #[tokio::test]
    async fn stale_version_commit_is_rejected_without_side_effects() {
        let (store, showtime) = seeded().await;
        let first = Booking::confirmed(showtime.id, vec![SeatNumber(1)], None);
        store.commit_reservation(0, &first).await.unwrap();

        let second = Booking::confirmed(showtime.id, vec![SeatNumber(2)], None);
        let err = store.commit_reservation(0, &second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let current = store.get_showtime(showtime.id).await.unwrap().unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.seats.status(SeatNumber(2)), Some(SeatStatus::Available));
        assert!(store.get_booking(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_keeps_cancelled_bookings_in_journal() {
        let (store, showtime) = seeded().await;
        let booking = Booking::confirmed(showtime.id, vec![SeatNumber(1)], Some(UserId::new("u")));
        store.commit_reservation(0, &booking).await.unwrap();

        let cancelled = store.delete_showtime(showtime.id, 1, Utc::now()).await.unwrap();
        assert_eq!(cancelled.len(), 1);
        assert!(store.get_showtime(showtime.id).await.unwrap().is_none());

        let kept = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(kept.status, BookingStatus::Cancelled);
        assert!(kept.cancelled_at.is_some());
    }

    #[tokio::test]
    async fn one_showtime_per_slot() {
        let (store, showtime) = seeded().await;

        let twin = Showtime::new(showtime.room_id, MovieId::new(), showtime.starts_at, &[SeatNumber(1)]);
        let err = store.insert_showtime(&twin).await.unwrap_err();
        assert!(matches!(err, StoreError::SlotTaken(at) if at == showtime.starts_at));

        let later = Showtime::new(
            showtime.room_id,
            MovieId::new(),
            showtime.starts_at + chrono::Duration::hours(3),
            &[SeatNumber(1)],
        );
        store.insert_showtime(&later).await.unwrap();
        let err = store.reschedule_showtime(later.id, 0, showtime.starts_at).await.unwrap_err();
        assert!(matches!(err, StoreError::SlotTaken(_)));
        assert_eq!(store.get_showtime(later.id).await.unwrap().unwrap().version, 0);
    }
}
