use std::sync::Arc;
use tracing::info;

use crate::error::{BookingError, BookingResult};
use crate::models::{Room, RoomId, Seat, SeatNumber};
use crate::storage::Store;

/// Схемы залов: чистый поиск, без изменений после регистрации зала.
#[derive(Clone)]
pub struct SeatMap {
    store: Arc<dyn Store>,
}

impl SeatMap {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Регистрирует зал со схемой мест (администрирование).
    pub async fn add_room(&self, name: impl Into<String>, seats: Vec<Seat>) -> BookingResult<Room> {
        let room = Room::new(name, seats)?;
        self.store.insert_room(&room).await?;
        info!("Room {} '{}' registered with {} seats", room.id, room.name, room.seats.len());
        Ok(room)
    }

    pub async fn get_room(&self, room_id: RoomId) -> BookingResult<Room> {
        self.store
            .get_room(room_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("room {}", room_id)))
    }

    pub async fn list_rooms(&self) -> BookingResult<Vec<Room>> {
        Ok(self.store.list_rooms().await?)
    }

    /// Номера мест зала в порядке схемы.
    pub async fn layout_for(&self, room_id: RoomId) -> BookingResult<Vec<SeatNumber>> {
        Ok(self.get_room(room_id).await?.seat_numbers())
    }

    pub async fn contains(&self, room_id: RoomId, seat: SeatNumber) -> BookingResult<bool> {
        Ok(self.get_room(room_id).await?.contains(seat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    #[tokio::test]
    async fn lookup_after_registration() {
        let map = SeatMap::new(Arc::new(InMemoryStore::new()));
        let room = map
            .add_room("Blue", vec![Seat::standard(10), Seat::standard(11)])
            .await
            .unwrap();

        assert_eq!(map.layout_for(room.id).await.unwrap(), vec![SeatNumber(10), SeatNumber(11)]);
        assert!(map.contains(room.id, SeatNumber(11)).await.unwrap());
        assert!(!map.contains(room.id, SeatNumber(12)).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let map = SeatMap::new(Arc::new(InMemoryStore::new()));
        let err = map.layout_for(RoomId::new()).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }
}
