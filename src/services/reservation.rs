//! reservation.rs
//!
//! Движок резервирования мест - единственный компонент, который меняет
//! статусы мест сеанса.
//!
//! Алгоритм `reserve`:
//! 1.  Проверки до любых изменений: сеанс существует, все места есть в схеме
//!     зала, нет повторов, количество мест в пределах лимита.
//! 2.  Захват области сеанса (`ScopeLocks<ShowtimeId>`), только по showtime_id.
//! 3.  Повторное чтение вектора мест внутри области.
//! 4.  Если хоть одно место занято - отказ целиком с перечнем занятых мест.
//! 5.  Иначе одна атомарная запись: места -> booked, версия +1, бронь в журнал.
//!     Запись условная (CAS по версии): если другой процесс успел раньше,
//!     область отпускается и попытка повторяется.
//! 6.  Событие `booking.confirmed` - только после записи и освобождения области.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config::BookingConfig;
use crate::error::{BookingError, BookingResult};
use crate::models::{Actor, Booking, BookingId, SeatNumber, Showtime, ShowtimeId, UserId};
use crate::services::events::{BookingEvent, EventPublisher};
use crate::services::ledger::BookingLedger;
use crate::services::locks::ScopeLocks;
use crate::services::seat_map::SeatMap;
use crate::storage::{Store, StoreError};

/// Запрос на бронь, уже разобранный и типизированный на границе API.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub showtime_id: ShowtimeId,
    pub seats: Vec<SeatNumber>,
    /// `None` - гостевая/ручная бронь.
    pub user_id: Option<UserId>,
}

impl ReserveRequest {
    pub fn new(showtime_id: ShowtimeId, seats: impl IntoIterator<Item = i32>, user_id: Option<UserId>) -> Self {
        Self {
            showtime_id,
            seats: seats.into_iter().map(SeatNumber).collect(),
            user_id,
        }
    }
}

#[derive(Clone)]
pub struct ReservationEngine {
    store: Arc<dyn Store>,
    seat_map: SeatMap,
    ledger: BookingLedger,
    locks: Arc<ScopeLocks<ShowtimeId>>,
    publisher: Arc<dyn EventPublisher>,
    config: BookingConfig,
}

impl ReservationEngine {
    pub fn new(
        store: Arc<dyn Store>,
        locks: Arc<ScopeLocks<ShowtimeId>>,
        publisher: Arc<dyn EventPublisher>,
        config: BookingConfig,
    ) -> Self {
        Self {
            seat_map: SeatMap::new(store.clone()),
            ledger: BookingLedger::new(store.clone()),
            store,
            locks,
            publisher,
            config,
        }
    }

    /// Области сеансов, общие с реестром.
    pub fn locks(&self) -> &Arc<ScopeLocks<ShowtimeId>> {
        &self.locks
    }

    /// Бронирует набор мест целиком или не бронирует ничего.
    #[instrument(skip(self, request), fields(showtime_id = %request.showtime_id, seats = request.seats.len()))]
    pub async fn reserve(&self, request: ReserveRequest) -> BookingResult<Booking> {
        let showtime = self.load_showtime(request.showtime_id).await?;
        self.validate(&showtime, &request.seats).await?;

        let booking = self.claim(&request).await?;

        // область уже отпущена
        self.publisher.publish(&BookingEvent::confirmed(&booking)).await;
        Ok(booking)
    }

    /// Отменяет бронь: места возвращаются в `available`, запись получает статус `cancelled`.
    /// Повторная отмена уже отменённой брони возвращает её без изменений.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn cancel(&self, booking_id: BookingId, actor: &Actor) -> BookingResult<Booking> {
        let booking = self.ledger.get(booking_id).await?;
        if !actor.may_act_for(booking.user_id.as_ref()) {
            return Err(BookingError::Forbidden(format!(
                "booking {} does not belong to {}",
                booking_id, actor.user_id
            )));
        }
        if !booking.is_active() {
            return Ok(booking);
        }

        let (booking, released) = self.release(booking_id, booking.showtime_id).await?;
        if released {
            self.publisher.publish(&BookingEvent::cancelled(&booking)).await;
        }
        Ok(booking)
    }

    async fn load_showtime(&self, showtime_id: ShowtimeId) -> BookingResult<Showtime> {
        self.store
            .get_showtime(showtime_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("showtime {}", showtime_id)))
    }

    // Порядок проверок фиксирован: неизвестные места, повторы, размер запроса
    async fn validate(&self, showtime: &Showtime, seats: &[SeatNumber]) -> BookingResult<()> {
        let layout: HashSet<SeatNumber> = self.seat_map.layout_for(showtime.room_id).await?.into_iter().collect();

        let mut unknown: Vec<SeatNumber> = seats.iter().copied().filter(|s| !layout.contains(s)).collect();
        if !unknown.is_empty() {
            unknown.sort();
            unknown.dedup();
            return Err(BookingError::UnknownSeat(unknown));
        }

        let mut seen = HashSet::with_capacity(seats.len());
        let mut duplicates: Vec<SeatNumber> = seats.iter().copied().filter(|s| !seen.insert(*s)).collect();
        if !duplicates.is_empty() {
            duplicates.sort();
            duplicates.dedup();
            return Err(BookingError::DuplicateSeat(duplicates));
        }

        if seats.is_empty() {
            return Err(BookingError::InvalidRequest("at least one seat is required".into()));
        }
        if seats.len() > self.config.max_seats_per_booking {
            return Err(BookingError::InvalidRequest(format!(
                "at most {} seats per booking, got {}",
                self.config.max_seats_per_booking,
                seats.len()
            )));
        }
        Ok(())
    }

    async fn claim(&self, request: &ReserveRequest) -> BookingResult<Booking> {
        for attempt in 0..=self.config.commit_retries {
            let _scope = self.locks.acquire(request.showtime_id).await?;

            // Читаем заново внутри области, а не снимок до захвата
            let showtime = self.load_showtime(request.showtime_id).await?;

            let conflicts = showtime.seats.conflicts(&request.seats);
            if !conflicts.is_empty() {
                warn!("Seats {:?} already booked for showtime {}", conflicts, showtime.id);
                return Err(BookingError::SeatUnavailable { conflicting_seats: conflicts });
            }

            let booking = Booking::confirmed(showtime.id, request.seats.clone(), request.user_id.clone());
            match self.ledger.append(showtime.version, &booking).await {
                Ok(()) => {
                    info!(
                        "Booking {} confirmed: showtime {}, seats {:?}",
                        booking.id, booking.showtime_id, booking.seats
                    );
                    return Ok(booking);
                }
                Err(StoreError::Conflict(_)) => {
                    warn!(
                        "Showtime {} changed underneath (version {}), retry {}/{}",
                        showtime.id, showtime.version, attempt + 1, self.config.commit_retries
                    );
                }
                Err(e) => {
                    // Запись не прошла - вектор не менялся, повтор безопасен
                    error!("Failed to persist booking for showtime {}: {:?}", showtime.id, e);
                    return Err(e.into());
                }
            }
        }

        warn!("Showtime {} still contended after {} retries", request.showtime_id, self.config.commit_retries);
        Err(BookingError::Busy)
    }

    async fn release(&self, booking_id: BookingId, showtime_id: ShowtimeId) -> BookingResult<(Booking, bool)> {
        for attempt in 0..=self.config.commit_retries {
            let _scope = self.locks.acquire(showtime_id).await?;

            // Статус мог измениться, пока ждали области
            let booking = self.ledger.get(booking_id).await?;
            if !booking.is_active() {
                return Ok((booking, false));
            }
            let showtime = self.load_showtime(showtime_id).await?;

            match self.ledger.mark_cancelled(showtime.version, &booking).await {
                Ok(cancelled) => {
                    info!(
                        "Booking {} cancelled: showtime {}, seats {:?} released",
                        cancelled.id, cancelled.showtime_id, cancelled.seats
                    );
                    return Ok((cancelled, true));
                }
                Err(StoreError::Conflict(_)) => {
                    warn!(
                        "Showtime {} changed during cancellation of {}, retry {}/{}",
                        showtime_id, booking_id, attempt + 1, self.config.commit_retries
                    );
                }
                Err(e) => {
                    error!("Failed to persist cancellation of booking {}: {:?}", booking_id, e);
                    return Err(e.into());
                }
            }
        }

        Err(BookingError::Busy)
    }
}
