use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::BookingResult;
use crate::models::{Booking, BookingId, SeatNumber, Showtime, ShowtimeId};
use crate::services::ledger::BookingLedger;
use crate::storage::Store;

const STABLE_READ_ATTEMPTS: usize = 3;

/// Расхождение между вектором мест сеанса и журналом.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// В векторе `booked`, но ни одна подтверждённая бронь место не держит.
    Orphaned { showtime_id: ShowtimeId, seats: Vec<SeatNumber> },
    /// Бронь держит место, а в векторе оно `available`.
    Unmarked { showtime_id: ShowtimeId, seats: Vec<SeatNumber> },
    /// Место в двух подтверждённых бронях одновременно.
    DoubleBooked { showtime_id: ShowtimeId, seat: SeatNumber, bookings: Vec<BookingId> },
}

#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub showtimes_checked: usize,
    /// Сеансы, удалённые во время сверки или менявшиеся при каждой попытке.
    pub showtimes_skipped: usize,
    pub divergences: Vec<Divergence>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Фоновая сверка: вектор мест каждого сеанса против журнала броней.
#[derive(Clone)]
pub struct ConsistencyAuditor {
    store: Arc<dyn Store>,
    ledger: BookingLedger,
}

impl ConsistencyAuditor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { ledger: BookingLedger::new(store.clone()), store }
    }

    /// Проходит по всем залам и сеансам.
    pub async fn run_audit(&self) -> BookingResult<AuditReport> {
        let mut report = AuditReport::default();

        for room in self.store.list_rooms().await? {
            for showtime in self.store.list_showtimes_by_room(room.id).await? {
                match self.check_showtime(&showtime).await? {
                    Some(divergences) => {
                        report.divergences.extend(divergences);
                        report.showtimes_checked += 1;
                    }
                    None => report.showtimes_skipped += 1,
                }
            }
        }

        if report.is_consistent() {
            info!(
                "Consistency audit passed: {} showtimes checked, {} skipped",
                report.showtimes_checked, report.showtimes_skipped
            );
        } else {
            for divergence in &report.divergences {
                error!("Seat vector and ledger diverge: {:?}", divergence);
            }
        }
        Ok(report)
    }

    /// Сверяет снимок сеанса с журналом.
    ///
    /// Вектор и журнал читаются разными запросами, поэтому после журнала
    /// версия сеанса перечитывается. Если она ушла вперёд, сверка повторяется
    /// на свежем снимке. `None`, если сеанс удалён или так и не удалось
    /// прочитать его без параллельной фиксации.
    pub async fn check_showtime(&self, showtime: &Showtime) -> BookingResult<Option<Vec<Divergence>>> {
        let mut snapshot = showtime.clone();

        for _ in 0..STABLE_READ_ATTEMPTS {
            let bookings = self.ledger.list_by_showtime(snapshot.id).await?;
            match self.store.get_showtime(snapshot.id).await? {
                Some(current) if current.version == snapshot.version => {
                    return Ok(Some(divergences(&snapshot, &bookings)));
                }
                Some(current) => snapshot = current,
                None => return Ok(None),
            }
        }

        debug!("Showtime {} kept changing during audit, skipped", showtime.id);
        Ok(None)
    }

    /// Периодический запуск сверки в фоне.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = self.run_audit().await {
                    error!("Consistency audit failed: {:?}", e);
                }
            }
        })
    }
}

fn divergences(showtime: &Showtime, bookings: &[Booking]) -> Vec<Divergence> {
    let mut holders: HashMap<SeatNumber, Vec<BookingId>> = HashMap::new();
    for booking in bookings.iter().filter(|b| b.is_active()) {
        for seat in &booking.seats {
            holders.entry(*seat).or_default().push(booking.id);
        }
    }

    let mut found = Vec::new();

    let mut double: Vec<_> = holders.iter().filter(|(_, ids)| ids.len() > 1).collect();
    double.sort_by_key(|(seat, _)| **seat);
    for (seat, ids) in double {
        found.push(Divergence::DoubleBooked {
            showtime_id: showtime.id,
            seat: *seat,
            bookings: ids.clone(),
        });
    }

    let held: BTreeSet<SeatNumber> = holders.keys().copied().collect();
    let marked: BTreeSet<SeatNumber> = showtime.seats.booked().into_iter().collect();

    let orphaned: Vec<SeatNumber> = marked.difference(&held).copied().collect();
    if !orphaned.is_empty() {
        found.push(Divergence::Orphaned { showtime_id: showtime.id, seats: orphaned });
    }
    let unmarked: Vec<SeatNumber> = held.difference(&marked).copied().collect();
    if !unmarked.is_empty() {
        found.push(Divergence::Unmarked { showtime_id: showtime.id, seats: unmarked });
    }

    found
}
