//! Внутрипроцессные подписчики шины событий.
//!
//! Сама доставка (почта, пуши, начисление баллов) внешняя; здесь только
//! дедупликация по (booking_id, тип события) и журналирование. Помнится
//! ограниченное окно последних событий: повторная доставка приходит вскоре
//! после первой.

use std::collections::{HashSet, VecDeque};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::BookingId;
use crate::services::events::{BookingEvent, BroadcastPublisher, EventKind};

const DEFAULT_DEDUP_WINDOW: usize = 10_000;

type EventKey = (BookingId, EventKind);

/// Идемпотентный приёмник событий.
#[derive(Debug)]
pub struct EventListener {
    name: &'static str,
    seen: HashSet<EventKey>,
    // порядок вытеснения из `seen`, старые спереди
    order: VecDeque<EventKey>,
    window: usize,
    handled: usize,
}

impl EventListener {
    pub fn new(name: &'static str) -> Self {
        Self::with_window(name, DEFAULT_DEDUP_WINDOW)
    }

    pub fn with_window(name: &'static str, window: usize) -> Self {
        let window = window.max(1);
        Self {
            name,
            seen: HashSet::with_capacity(window),
            order: VecDeque::with_capacity(window),
            window,
            handled: 0,
        }
    }

    /// Возвращает `false` для повторной доставки того же события.
    pub fn handle(&mut self, event: &BookingEvent) -> bool {
        let key = (event.booking_id, event.kind);
        if !self.seen.insert(key) {
            debug!("{}: duplicate {} for booking {} skipped", self.name, event.kind.as_str(), event.booking_id);
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.window {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.handled += 1;

        match (self.name, event.kind) {
            ("loyalty", EventKind::Confirmed) => info!(
                "loyalty: accrue for booking {} ({} seats, user {:?})",
                event.booking_id,
                event.seats.len(),
                event.user_id
            ),
            ("loyalty", EventKind::Cancelled) => {
                info!("loyalty: revert accrual for booking {}", event.booking_id)
            }
            (name, kind) => info!(
                "{}: {} for booking {} (showtime {}, seats {:?})",
                name,
                kind.as_str(),
                event.booking_id,
                event.showtime_id,
                event.seats
            ),
        }
        true
    }

    pub fn handled(&self) -> usize {
        self.handled
    }

    /// Сколько ключей сейчас в окне дедупликации.
    pub fn remembered(&self) -> usize {
        self.seen.len()
    }

    async fn run(mut self, mut rx: broadcast::Receiver<BookingEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    self.handle(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{}: lagged behind the event bus, {} events skipped", self.name, skipped);
                }
                Err(RecvError::Closed) => {
                    info!("{}: event bus closed after {} events", self.name, self.handled());
                    return;
                }
            }
        }
    }
}

/// Подписывает диспетчер уведомлений и начисление лояльности на шину.
pub fn spawn_listeners(bus: &BroadcastPublisher) -> Vec<JoinHandle<()>> {
    ["notifications", "loyalty"]
        .into_iter()
        .map(|name| {
            let rx = bus.subscribe();
            tokio::spawn(EventListener::new(name).run(rx))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Booking, SeatNumber, ShowtimeId};
    use crate::services::events::EventPublisher;

    #[test]
    fn redelivery_is_ignored() {
        let booking = Booking::confirmed(ShowtimeId::new(), vec![SeatNumber(1)], None);
        let mut listener = EventListener::new("notifications");

        assert!(listener.handle(&BookingEvent::confirmed(&booking)));
        assert!(!listener.handle(&BookingEvent::confirmed(&booking)));
        assert!(listener.handle(&BookingEvent::cancelled(&booking)));
        assert_eq!(listener.handled(), 2);
    }

    #[test]
    fn dedup_window_stays_bounded() {
        let mut listener = EventListener::with_window("loyalty", 3);
        let bookings: Vec<_> = (1..=5)
            .map(|n| Booking::confirmed(ShowtimeId::new(), vec![SeatNumber(n)], None))
            .collect();

        for booking in &bookings {
            assert!(listener.handle(&BookingEvent::confirmed(booking)));
        }
        assert_eq!(listener.remembered(), 3);
        assert_eq!(listener.handled(), 5);

        // свежая повторная доставка всё ещё отсекается
        assert!(!listener.handle(&BookingEvent::confirmed(&bookings[4])));
        assert!(!listener.handle(&BookingEvent::confirmed(&bookings[2])));
        // вытесненная считается новой
        assert!(listener.handle(&BookingEvent::confirmed(&bookings[0])));
        assert_eq!(listener.remembered(), 3);
    }

    #[tokio::test]
    async fn listeners_stop_when_bus_is_dropped() {
        let bus = BroadcastPublisher::default();
        let handles = spawn_listeners(&bus);

        let booking = Booking::confirmed(ShowtimeId::new(), vec![SeatNumber(3)], None);
        bus.publish(&BookingEvent::confirmed(&booking)).await;
        drop(bus);

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
