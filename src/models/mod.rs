pub mod user;
pub mod room;
pub mod showtime;
pub mod booking;

pub use user::{Actor, Role, UserId};
pub use room::{Room, Seat, SeatKind, SeatNumber};
pub use showtime::{SeatStatus, SeatVector, Showtime};
pub use booking::{Booking, BookingStatus};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Идентификаторы на базе UUID: отдельный тип на каждую сущность,
// чтобы showtime_id нельзя было случайно передать вместо booking_id
macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(RoomId);
uuid_id!(ShowtimeId);
uuid_id!(BookingId);
uuid_id!(MovieId);
