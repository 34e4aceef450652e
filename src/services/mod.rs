pub mod audit;
pub mod events;
pub mod ledger;
pub mod locks;
pub mod notifications;
pub mod query;
pub mod registry;
pub mod reservation;
pub mod seat_map;

pub use audit::{AuditReport, ConsistencyAuditor, Divergence};
pub use events::{
    BackgroundPublisher, BookingEvent, BroadcastPublisher, EventKind, EventPublisher, FanoutPublisher,
    RedisStreamPublisher,
};
pub use ledger::BookingLedger;
pub use locks::ScopeLocks;
pub use query::BookingQueryService;
pub use registry::ShowtimeRegistry;
pub use reservation::{ReservationEngine, ReserveRequest};
pub use seat_map::SeatMap;
