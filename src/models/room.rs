use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::RoomId;
use crate::error::BookingError;

/// Номер места внутри зала. Стабилен на всё время жизни зала.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatNumber(pub i32);

impl fmt::Display for SeatNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i32> for SeatNumber {
    fn from(n: i32) -> Self {
        Self(n)
    }
}

// Тип места - метаданные для ценообразования, ядро их не интерпретирует
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatKind {
    #[default]
    Standard,
    Premium,
}

impl SeatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatKind::Standard => "standard",
            SeatKind::Premium => "premium",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "premium" => SeatKind::Premium,
            _ => SeatKind::Standard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub number: SeatNumber,
    /// Подпись для отображения, например "A5".
    pub label: String,
    pub kind: SeatKind,
}

impl Seat {
    pub fn new(number: i32, label: impl Into<String>, kind: SeatKind) -> Self {
        Self { number: SeatNumber(number), label: label.into(), kind }
    }

    pub fn standard(number: i32) -> Self {
        Self::new(number, number.to_string(), SeatKind::Standard)
    }
}

/// Зал с неизменяемой схемой мест. Порядок мест в `seats` - порядок отображения.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub seats: Vec<Seat>,
}

impl Room {
    pub fn new(name: impl Into<String>, seats: Vec<Seat>) -> Result<Self, BookingError> {
        Self::with_id(RoomId::new(), name, seats)
    }

    pub fn with_id(id: RoomId, name: impl Into<String>, seats: Vec<Seat>) -> Result<Self, BookingError> {
        if seats.is_empty() {
            return Err(BookingError::InvalidRequest("room layout must contain at least one seat".into()));
        }

        let mut seen = HashSet::with_capacity(seats.len());
        let mut duplicates: Vec<SeatNumber> = seats
            .iter()
            .filter(|seat| !seen.insert(seat.number))
            .map(|seat| seat.number)
            .collect();
        if !duplicates.is_empty() {
            duplicates.sort();
            duplicates.dedup();
            return Err(BookingError::InvalidRequest(format!(
                "duplicate seat numbers in layout: {}",
                join_seats(&duplicates)
            )));
        }

        Ok(Self { id, name: name.into(), seats })
    }

    pub fn seat_numbers(&self) -> Vec<SeatNumber> {
        self.seats.iter().map(|s| s.number).collect()
    }

    pub fn contains(&self, number: SeatNumber) -> bool {
        self.seats.iter().any(|s| s.number == number)
    }
}

pub(crate) fn join_seats(seats: &[SeatNumber]) -> String {
    seats.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
}
