//! Исходящие события бронирования.
//!
//! Публикуются только после успешной фиксации и после освобождения области
//! сеанса. Доставка at-least-once: потребители обязаны быть идемпотентны по
//! `booking_id`. Ошибки публикации логируются и не влияют на результат брони.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use crate::models::{Booking, BookingId, SeatNumber, ShowtimeId, UserId};
use crate::redis_client::RedisClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "booking.confirmed")]
    Confirmed,
    #[serde(rename = "booking.cancelled")]
    Cancelled,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Confirmed => "booking.confirmed",
            EventKind::Cancelled => "booking.cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub booking_id: BookingId,
    pub user_id: Option<UserId>,
    pub showtime_id: ShowtimeId,
    pub seats: Vec<SeatNumber>,
}

impl BookingEvent {
    pub fn confirmed(booking: &Booking) -> Self {
        Self::from_booking(EventKind::Confirmed, booking)
    }

    pub fn cancelled(booking: &Booking) -> Self {
        Self::from_booking(EventKind::Cancelled, booking)
    }

    fn from_booking(kind: EventKind, booking: &Booking) -> Self {
        Self {
            kind,
            booking_id: booking.id,
            user_id: booking.user_id.clone(),
            showtime_id: booking.showtime_id,
            seats: booking.seats.clone(),
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &BookingEvent);
}

/// Шина внутри процесса на `tokio::sync::broadcast`.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<BookingEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &BookingEvent) {
        // Нет подписчиков - не ошибка
        if self.tx.send(event.clone()).is_err() {
            debug!("no in-process subscribers for {}", event.kind.as_str());
        }
    }
}

/// Публикация в Redis Stream (`XADD`), с повторами для at-least-once.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    redis: RedisClient,
    stream: String,
    max_attempts: u32,
}

impl RedisStreamPublisher {
    pub fn new(redis: RedisClient, stream: impl Into<String>) -> Self {
        Self { redis, stream: stream.into(), max_attempts: 3 }
    }

    async fn xadd(&self, event: &BookingEvent, payload: &str) -> redis::RedisResult<String> {
        let mut conn = self.redis.conn.clone();
        redis::cmd("XADD")
            .arg(&self.stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(100_000)
            .arg("*")
            .arg("type")
            .arg(event.kind.as_str())
            .arg("booking_id")
            .arg(event.booking_id.to_string())
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, event: &BookingEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                error!("failed to serialize {} event: {:?}", event.kind.as_str(), e);
                return;
            }
        };

        let mut delay = Duration::from_millis(50);
        for attempt in 1..=self.max_attempts {
            match self.xadd(event, &payload).await {
                Ok(entry_id) => {
                    debug!("{} for booking {} published as {}", event.kind.as_str(), event.booking_id, entry_id);
                    return;
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!("XADD attempt {} for booking {} failed: {:?}", attempt, event.booking_id, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    error!(
                        "giving up on {} for booking {} after {} attempts: {:?}",
                        event.kind.as_str(),
                        event.booking_id,
                        attempt,
                        e
                    );
                }
            }
        }
    }
}

/// Рассылает событие во все вложенные публикаторы по очереди.
#[derive(Clone, Default)]
pub struct FanoutPublisher {
    targets: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: Arc<dyn EventPublisher>) -> Self {
        self.targets.push(target);
        self
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, event: &BookingEvent) {
        for target in &self.targets {
            target.publish(event).await;
        }
    }
}

/// Отдаёт события вложенному публикатору через очередь и одну фоновую задачу.
///
/// `publish` не ждёт внешнего транспорта: повторы и задержки Redis остаются
/// в фоне, порядок событий сохраняется. При переполнении очереди событие
/// отбрасывается с ошибкой в логе.
#[derive(Clone)]
pub struct BackgroundPublisher {
    tx: mpsc::Sender<BookingEvent>,
}

impl BackgroundPublisher {
    /// Запускает фоновую задачу; нужен работающий tokio runtime.
    pub fn spawn(inner: Arc<dyn EventPublisher>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<BookingEvent>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                inner.publish(&event).await;
            }
            debug!("background publisher stopped");
        });
        Self { tx }
    }
}

#[async_trait]
impl EventPublisher for BackgroundPublisher {
    async fn publish(&self, event: &BookingEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                error!("event queue is full, {} for booking {} dropped", event.kind.as_str(), event.booking_id);
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                error!("event worker is gone, {} for booking {} dropped", event.kind.as_str(), event.booking_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_dotted_type() {
        let booking = Booking::confirmed(ShowtimeId::new(), vec![SeatNumber(2), SeatNumber(1)], Some(UserId::new("u-7")));
        let json = serde_json::to_value(BookingEvent::confirmed(&booking)).unwrap();

        assert_eq!(json["type"], "booking.confirmed");
        assert_eq!(json["user_id"], "u-7");
        assert_eq!(json["seats"], serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn fanout_reaches_every_bus() {
        let a = BroadcastPublisher::default();
        let b = BroadcastPublisher::default();
        let mut rx_a = a.subscribe();
        let mut rx_b = b.subscribe();
        let fanout = FanoutPublisher::new().with(Arc::new(a)).with(Arc::new(b));

        let booking = Booking::confirmed(ShowtimeId::new(), vec![SeatNumber(1)], None);
        fanout.publish(&BookingEvent::cancelled(&booking)).await;

        assert_eq!(rx_a.recv().await.unwrap().kind, EventKind::Cancelled);
        assert_eq!(rx_b.recv().await.unwrap().booking_id, booking.id);
    }

    struct SlowPublisher {
        delay: Duration,
        out: BroadcastPublisher,
    }

    #[async_trait]
    impl EventPublisher for SlowPublisher {
        async fn publish(&self, event: &BookingEvent) {
            tokio::time::sleep(self.delay).await;
            self.out.publish(event).await;
        }
    }

    #[tokio::test]
    async fn background_publish_does_not_wait_for_transport() {
        let out = BroadcastPublisher::default();
        let mut rx = out.subscribe();
        let slow = SlowPublisher { delay: Duration::from_millis(200), out };
        let background = BackgroundPublisher::spawn(Arc::new(slow), 16);

        let booking = Booking::confirmed(ShowtimeId::new(), vec![SeatNumber(1)], None);
        let started = tokio::time::Instant::now();
        background.publish(&BookingEvent::confirmed(&booking)).await;
        background.publish(&BookingEvent::cancelled(&booking)).await;
        assert!(started.elapsed() < Duration::from_millis(100));

        // порядок сохраняется
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Confirmed);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Cancelled);
    }
}
