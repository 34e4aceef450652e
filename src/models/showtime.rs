use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{MovieId, RoomId, SeatNumber, ShowtimeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Booked => "booked",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "available" => Some(SeatStatus::Available),
            "booked" => Some(SeatStatus::Booked),
            _ => None,
        }
    }
}

/// Статусы мест одного сеанса. Набор ключей совпадает со схемой зала
/// и не меняется после создания сеанса: переходы только меняют значения.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeatVector(BTreeMap<SeatNumber, SeatStatus>);

impl SeatVector {
    pub fn all_available(layout: &[SeatNumber]) -> Self {
        Self(layout.iter().map(|n| (*n, SeatStatus::Available)).collect())
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (SeatNumber, SeatStatus)>) -> Self {
        Self(entries.into_iter().collect())
    }

    pub fn status(&self, seat: SeatNumber) -> Option<SeatStatus> {
        self.0.get(&seat).copied()
    }

    pub fn contains(&self, seat: SeatNumber) -> bool {
        self.0.contains_key(&seat)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SeatNumber, SeatStatus)> + '_ {
        self.0.iter().map(|(n, s)| (*n, *s))
    }

    pub fn booked(&self) -> Vec<SeatNumber> {
        self.seats_with(SeatStatus::Booked)
    }

    pub fn available(&self) -> Vec<SeatNumber> {
        self.seats_with(SeatStatus::Available)
    }

    pub fn has_bookings(&self) -> bool {
        self.0.values().any(|s| *s == SeatStatus::Booked)
    }

    /// Запрошенные места, которые уже заняты, по возрастанию номера.
    pub fn conflicts(&self, requested: &[SeatNumber]) -> Vec<SeatNumber> {
        let mut taken: Vec<SeatNumber> = requested
            .iter()
            .copied()
            .filter(|n| self.status(*n) == Some(SeatStatus::Booked))
            .collect();
        taken.sort();
        taken.dedup();
        taken
    }

    /// Копия вектора с переведёнными местами. Исходный вектор не трогаем:
    /// новое состояние становится видимым только после записи в хранилище.
    pub fn with_status(&self, seats: &[SeatNumber], status: SeatStatus) -> Self {
        let mut next = self.0.clone();
        for seat in seats {
            if let Some(slot) = next.get_mut(seat) {
                *slot = status;
            }
        }
        Self(next)
    }

    fn seats_with(&self, status: SeatStatus) -> Vec<SeatNumber> {
        self.0.iter().filter(|(_, s)| **s == status).map(|(n, _)| *n).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Showtime {
    pub id: ShowtimeId,
    pub room_id: RoomId,
    pub movie_id: MovieId,
    pub starts_at: DateTime<Utc>,
    pub seats: SeatVector,
    /// Версия для compare-and-swap, растёт на каждой фиксации.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Showtime {
    pub fn new(room_id: RoomId, movie_id: MovieId, starts_at: DateTime<Utc>, layout: &[SeatNumber]) -> Self {
        Self {
            id: ShowtimeId::new(),
            room_id,
            movie_id,
            starts_at,
            seats: SeatVector::all_available(layout),
            version: 0,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seats(ns: &[i32]) -> Vec<SeatNumber> {
        ns.iter().map(|n| SeatNumber(*n)).collect()
    }

    #[test]
    fn conflicts_report_only_taken_requested_seats() {
        let vector = SeatVector::all_available(&seats(&[1, 2, 3, 4]))
            .with_status(&seats(&[2, 4]), SeatStatus::Booked);

        assert_eq!(vector.conflicts(&seats(&[4, 3, 2])), seats(&[2, 4]));
        assert!(vector.conflicts(&seats(&[1, 3])).is_empty());
    }

    #[test]
    fn with_status_never_adds_keys() {
        let vector = SeatVector::all_available(&seats(&[1, 2]));
        let next = vector.with_status(&seats(&[2, 9]), SeatStatus::Booked);

        assert_eq!(next.len(), 2);
        assert!(!next.contains(SeatNumber(9)));
        assert_eq!(next.booked(), seats(&[2]));
        // исходный вектор не изменился
        assert!(!vector.has_bookings());
    }
}
