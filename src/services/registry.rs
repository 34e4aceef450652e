use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::BookingConfig;
use crate::error::{BookingError, BookingResult};
use crate::models::{Booking, MovieId, RoomId, Showtime, ShowtimeId};
use crate::services::events::{BookingEvent, EventPublisher};
use crate::services::locks::ScopeLocks;
use crate::services::seat_map::SeatMap;
use crate::storage::{Store, StoreError};

/// Реестр сеансов зала.
///
/// Создание сеансов в одном зале сериализуется областью зала, изменение и
/// удаление сеанса - ещё и областью сеанса (той же, что у движка). Порядок
/// захвата всегда зал -> сеанс.
#[derive(Clone)]
pub struct ShowtimeRegistry {
    store: Arc<dyn Store>,
    seat_map: SeatMap,
    room_locks: Arc<ScopeLocks<RoomId>>,
    showtime_locks: Arc<ScopeLocks<ShowtimeId>>,
    publisher: Arc<dyn EventPublisher>,
    config: BookingConfig,
}

impl ShowtimeRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        showtime_locks: Arc<ScopeLocks<ShowtimeId>>,
        publisher: Arc<dyn EventPublisher>,
        config: BookingConfig,
    ) -> Self {
        Self {
            seat_map: SeatMap::new(store.clone()),
            room_locks: Arc::new(ScopeLocks::new(config.scope_timeout)),
            store,
            showtime_locks,
            publisher,
            config,
        }
    }

    /// Создаёт сеанс со всеми местами в статусе `available`.
    pub async fn create(
        &self,
        room_id: RoomId,
        movie_id: MovieId,
        starts_at: DateTime<Utc>,
    ) -> BookingResult<ShowtimeId> {
        let layout = match self.seat_map.layout_for(room_id).await {
            Ok(layout) => layout,
            Err(BookingError::NotFound(_)) => {
                return Err(BookingError::InvalidSchedule(format!("room {} does not exist", room_id)))
            }
            Err(e) => return Err(e),
        };

        let _room = self.room_locks.acquire(room_id).await?;
        self.ensure_slot_free(room_id, starts_at, None).await?;

        let showtime = Showtime::new(room_id, movie_id, starts_at, &layout);
        self.store.insert_showtime(&showtime).await.map_err(store_error)?;
        info!("Showtime {} created in room {} at {}", showtime.id, room_id, starts_at);
        Ok(showtime.id)
    }

    pub async fn get(&self, showtime_id: ShowtimeId) -> BookingResult<Showtime> {
        self.store
            .get_showtime(showtime_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("showtime {}", showtime_id)))
    }

    pub async fn list_by_room(&self, room_id: RoomId) -> BookingResult<Vec<Showtime>> {
        // неизвестный зал - NotFound, а не пустой список
        self.seat_map.get_room(room_id).await?;
        Ok(self.store.list_showtimes_by_room(room_id).await?)
    }

    /// Переносит сеанс. Нельзя, если на него уже есть брони.
    pub async fn update(&self, showtime_id: ShowtimeId, starts_at: DateTime<Utc>) -> BookingResult<Showtime> {
        let room_id = self.get(showtime_id).await?.room_id;
        let _room = self.room_locks.acquire(room_id).await?;
        let _scope = self.showtime_locks.acquire(showtime_id).await?;

        let showtime = self.get(showtime_id).await?;
        if showtime.seats.has_bookings() {
            return Err(BookingError::HasActiveBookings);
        }
        self.ensure_slot_free(room_id, starts_at, Some(showtime_id)).await?;

        self.store
            .reschedule_showtime(showtime_id, showtime.version, starts_at)
            .await
            .map_err(store_error)?;
        info!("Showtime {} moved from {} to {}", showtime_id, showtime.starts_at, starts_at);

        Ok(Showtime { starts_at, version: showtime.version + 1, ..showtime })
    }

    /// Удаляет сеанс. С бронями - только `force` при разрешённом в конфигурации
    /// принудительном удалении; брони при этом отменяются каскадом.
    pub async fn delete(&self, showtime_id: ShowtimeId, force: bool) -> BookingResult<Vec<Booking>> {
        let room_id = self.get(showtime_id).await?.room_id;
        let cancelled = {
            let _room = self.room_locks.acquire(room_id).await?;
            let _scope = self.showtime_locks.acquire(showtime_id).await?;

            let showtime = self.get(showtime_id).await?;
            if showtime.seats.has_bookings() && !(force && self.config.allow_force_delete) {
                return Err(BookingError::HasActiveBookings);
            }

            self.store
                .delete_showtime(showtime_id, showtime.version, Utc::now())
                .await
                .map_err(store_error)?
        };

        if cancelled.is_empty() {
            info!("Showtime {} deleted", showtime_id);
        } else {
            warn!("Showtime {} force-deleted, {} bookings cancelled", showtime_id, cancelled.len());
        }

        // области отпущены, уведомляем владельцев отменённых броней
        for booking in &cancelled {
            self.publisher.publish(&BookingEvent::cancelled(booking)).await;
        }
        Ok(cancelled)
    }

    async fn ensure_slot_free(
        &self,
        room_id: RoomId,
        starts_at: DateTime<Utc>,
        except: Option<ShowtimeId>,
    ) -> BookingResult<()> {
        // за пределами TimeDelta любое окно конфликтует со всеми сеансами
        let window = Duration::try_minutes(self.config.showtime_overlap_minutes.max(0)).unwrap_or(Duration::MAX);
        let existing = self.store.list_showtimes_by_room(room_id).await?;

        let clash = existing
            .iter()
            .filter(|s| Some(s.id) != except)
            .find(|s| slots_overlap(s.starts_at, starts_at, window));

        match clash {
            Some(other) => Err(BookingError::InvalidSchedule(format!(
                "room {} already has showtime {} at {}",
                room_id, other.id, other.starts_at
            ))),
            None => Ok(()),
        }
    }
}

fn slots_overlap(a: DateTime<Utc>, b: DateTime<Utc>, window: Duration) -> bool {
    if window.is_zero() {
        return a == b;
    }
    (a - b).abs() < window
}

// Внутри областей CAS может проиграть только другому процессу,
// и слот может занять только он же
fn store_error(e: StoreError) -> BookingError {
    match e {
        StoreError::Conflict(_) => BookingError::Busy,
        StoreError::SlotTaken(at) => BookingError::InvalidSchedule(format!("room already has a showtime at {}", at)),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Seat;
    use crate::services::events::BroadcastPublisher;
    use crate::storage::InMemoryStore;
    use chrono::TimeZone;

    async fn registry(config: BookingConfig) -> (ShowtimeRegistry, RoomId) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let room = SeatMap::new(store.clone())
            .add_room("Red", vec![Seat::standard(1), Seat::standard(2)])
            .await
            .unwrap();
        let locks = Arc::new(ScopeLocks::new(config.scope_timeout));
        let registry = ShowtimeRegistry::new(store, locks, Arc::new(BroadcastPublisher::default()), config);
        (registry, room.id)
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn exact_slot_conflicts_by_default() {
        let (registry, room) = registry(BookingConfig::default()).await;
        registry.create(room, MovieId::new(), at(18, 0)).await.unwrap();

        let err = registry.create(room, MovieId::new(), at(18, 0)).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidSchedule(_)));
        assert!(registry.create(room, MovieId::new(), at(18, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn overlap_window_from_config() {
        let config = BookingConfig { showtime_overlap_minutes: 120, ..BookingConfig::default() };
        let (registry, room) = registry(config).await;
        registry.create(room, MovieId::new(), at(18, 0)).await.unwrap();

        assert!(registry.create(room, MovieId::new(), at(19, 59)).await.is_err());
        assert!(registry.create(room, MovieId::new(), at(16, 1)).await.is_err());
        assert!(registry.create(room, MovieId::new(), at(20, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_room_is_invalid_schedule() {
        let (registry, _) = registry(BookingConfig::default()).await;
        let err = registry.create(RoomId::new(), MovieId::new(), at(10, 0)).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidSchedule(_)));
    }

    #[tokio::test]
    async fn reschedule_skips_own_slot() {
        let config = BookingConfig { showtime_overlap_minutes: 60, ..BookingConfig::default() };
        let (registry, room) = registry(config).await;
        let id = registry.create(room, MovieId::new(), at(12, 0)).await.unwrap();
        registry.create(room, MovieId::new(), at(15, 0)).await.unwrap();

        let moved = registry.update(id, at(12, 30)).await.unwrap();
        assert_eq!(moved.starts_at, at(12, 30));
        assert!(registry.update(id, at(14, 30)).await.is_err());

        let listed = registry.list_by_room(room).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, id);
    }

    #[tokio::test]
    async fn delete_without_bookings() {
        let (registry, room) = registry(BookingConfig::default()).await;
        let id = registry.create(room, MovieId::new(), at(21, 0)).await.unwrap();

        assert!(registry.delete(id, false).await.unwrap().is_empty());
        assert!(matches!(registry.get(id).await, Err(BookingError::NotFound(_))));
    }

    #[tokio::test]
    async fn out_of_range_window_blocks_instead_of_panicking() {
        let config = BookingConfig { showtime_overlap_minutes: i64::MAX, ..BookingConfig::default() };
        let (registry, room) = registry(config).await;
        registry.create(room, MovieId::new(), at(9, 0)).await.unwrap();

        let err = registry.create(room, MovieId::new(), at(23, 0)).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidSchedule(_)));
    }
}
