use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookingId, SeatNumber, ShowtimeId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

/// Запись журнала бронирований. Набор мест после подтверждения не меняется,
/// отмена только переводит статус и проставляет `cancelled_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    /// `None` для гостевых и ручных броней.
    pub user_id: Option<UserId>,
    pub showtime_id: ShowtimeId,
    pub seats: Vec<SeatNumber>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    // Конструктор доступен только внутри крейта: бронь создаётся
    // исключительно при успешной фиксации в движке резервирования
    pub(crate) fn confirmed(showtime_id: ShowtimeId, mut seats: Vec<SeatNumber>, user_id: Option<UserId>) -> Self {
        seats.sort();
        Self {
            id: BookingId::new(),
            user_id,
            showtime_id,
            seats,
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
            cancelled_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}
