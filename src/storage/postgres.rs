use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::{Cancellation, Store, StoreError, StoreResult};
use crate::database::Database;
use crate::models::{
    Booking, BookingId, BookingStatus, Room, RoomId, Seat, SeatKind, SeatNumber, SeatStatus,
    SeatVector, Showtime, ShowtimeId, UserId,
};

/// Хранилище на Postgres. Вектор мест лежит построчно в `showtime_seats`,
/// фиксация - одна транзакция с CAS по `showtimes.version`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }
}

// Снимок сеанса одним запросом, чтобы версия и статусы мест
// были прочитаны из одного снимка базы
const SHOWTIME_SELECT: &str = r#"
    SELECT s.id, s.room_id, s.movie_id, s.starts_at, s.version, s.created_at,
           COALESCE(array_agg(ss.seat_number ORDER BY ss.seat_number)
                    FILTER (WHERE ss.seat_number IS NOT NULL), '{}') AS seat_numbers,
           COALESCE(array_agg(ss.status ORDER BY ss.seat_number)
                    FILTER (WHERE ss.seat_number IS NOT NULL), '{}') AS seat_statuses
    FROM showtimes s
    LEFT JOIN showtime_seats ss ON ss.showtime_id = s.id
"#;

// Уникальный индекс из 0002_showtime_slot_unique.sql
const SLOT_CONSTRAINT: &str = "uq_showtimes_room_slot";

fn slot_error(e: sqlx::Error, starts_at: DateTime<Utc>) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.constraint() == Some(SLOT_CONSTRAINT) => StoreError::SlotTaken(starts_at),
        _ => e.into(),
    }
}

const BOOKING_SELECT: &str =
    "SELECT id, user_id, showtime_id, seats, status, created_at, cancelled_at FROM bookings";

#[derive(FromRow)]
struct RoomRow {
    id: Uuid,
    name: String,
}

#[derive(FromRow)]
struct RoomSeatRow {
    room_id: Uuid,
    seat_number: i32,
    label: String,
    kind: String,
}

#[derive(FromRow)]
struct ShowtimeRow {
    id: Uuid,
    room_id: Uuid,
    movie_id: Uuid,
    starts_at: DateTime<Utc>,
    version: i64,
    created_at: DateTime<Utc>,
    seat_numbers: Vec<i32>,
    seat_statuses: Vec<String>,
}

impl TryFrom<ShowtimeRow> for Showtime {
    type Error = StoreError;

    fn try_from(row: ShowtimeRow) -> Result<Self, Self::Error> {
        if row.seat_numbers.len() != row.seat_statuses.len() {
            return Err(StoreError::Corrupted(format!("seat arrays mismatch for showtime {}", row.id)));
        }
        let mut entries = Vec::with_capacity(row.seat_numbers.len());
        for (number, status) in row.seat_numbers.into_iter().zip(row.seat_statuses) {
            let status = SeatStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupted(format!("unknown seat status '{}'", status)))?;
            entries.push((SeatNumber(number), status));
        }

        Ok(Showtime {
            id: ShowtimeId(row.id),
            room_id: RoomId(row.room_id),
            movie_id: row.movie_id.into(),
            starts_at: row.starts_at,
            seats: SeatVector::from_entries(entries),
            version: row.version,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Option<String>,
    showtime_id: Uuid,
    seats: Vec<i32>,
    status: String,
    created_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupted(format!("unknown booking status '{}'", row.status)))?;
        Ok(Booking {
            id: BookingId(row.id),
            user_id: row.user_id.map(UserId),
            showtime_id: ShowtimeId(row.showtime_id),
            seats: row.seats.into_iter().map(SeatNumber).collect(),
            status,
            created_at: row.created_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

fn seat_ints(seats: &[SeatNumber]) -> Vec<i32> {
    seats.iter().map(|s| s.0).collect()
}

fn into_bookings(rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

impl PgStore {
    async fn load_room_seats(&self, room_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Vec<Seat>>> {
        let rows = sqlx::query_as::<_, RoomSeatRow>(
            "SELECT room_id, seat_number, label, kind
             FROM room_seats
             WHERE room_id = ANY($1)
             ORDER BY room_id, position",
        )
        .bind(room_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut layouts: HashMap<Uuid, Vec<Seat>> = HashMap::new();
        for row in rows {
            layouts.entry(row.room_id).or_default().push(Seat {
                number: SeatNumber(row.seat_number),
                label: row.label,
                kind: SeatKind::parse(&row.kind),
            });
        }
        Ok(layouts)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_room(&self, room: &Room) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO rooms (id, name) VALUES ($1, $2)")
            .bind(room.id.0)
            .bind(&room.name)
            .execute(&mut *tx)
            .await?;

        let numbers: Vec<i32> = room.seats.iter().map(|s| s.number.0).collect();
        let labels: Vec<String> = room.seats.iter().map(|s| s.label.clone()).collect();
        let kinds: Vec<String> = room.seats.iter().map(|s| s.kind.as_str().to_string()).collect();
        let positions: Vec<i32> = (0..room.seats.len() as i32).collect();

        sqlx::query(
            r#"
            INSERT INTO room_seats (room_id, seat_number, label, kind, position)
            SELECT $1, n, l, k, p
            FROM UNNEST($2::int[], $3::text[], $4::text[], $5::int[]) AS t(n, l, k, p)
            "#,
        )
        .bind(room.id.0)
        .bind(&numbers)
        .bind(&labels)
        .bind(&kinds)
        .bind(&positions)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>> {
        let row = sqlx::query_as::<_, RoomRow>("SELECT id, name FROM rooms WHERE id = $1")
            .bind(room_id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut layouts = self.load_room_seats(&[row.id]).await?;
        Ok(Some(Room {
            id: RoomId(row.id),
            name: row.name,
            seats: layouts.remove(&row.id).unwrap_or_default(),
        }))
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let rows = sqlx::query_as::<_, RoomRow>("SELECT id, name FROM rooms ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut layouts = self.load_room_seats(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| Room {
                id: RoomId(row.id),
                seats: layouts.remove(&row.id).unwrap_or_default(),
                name: row.name,
            })
            .collect())
    }

    async fn insert_showtime(&self, showtime: &Showtime) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO showtimes (id, room_id, movie_id, starts_at, version, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(showtime.id.0)
        .bind(showtime.room_id.0)
        .bind(showtime.movie_id.0)
        .bind(showtime.starts_at)
        .bind(showtime.version)
        .bind(showtime.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| slot_error(e, showtime.starts_at))?;

        let numbers: Vec<i32> = showtime.seats.iter().map(|(n, _)| n.0).collect();
        let statuses: Vec<String> = showtime.seats.iter().map(|(_, s)| s.as_str().to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO showtime_seats (showtime_id, seat_number, status)
            SELECT $1, n, s FROM UNNEST($2::int[], $3::text[]) AS t(n, s)
            "#,
        )
        .bind(showtime.id.0)
        .bind(&numbers)
        .bind(&statuses)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Option<Showtime>> {
        let query = format!("{} WHERE s.id = $1 GROUP BY s.id", SHOWTIME_SELECT);
        let row = sqlx::query_as::<_, ShowtimeRow>(&query)
            .bind(showtime_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Showtime::try_from).transpose()
    }

    async fn list_showtimes_by_room(&self, room_id: RoomId) -> StoreResult<Vec<Showtime>> {
        let query = format!(
            "{} WHERE s.room_id = $1 GROUP BY s.id ORDER BY s.starts_at",
            SHOWTIME_SELECT
        );
        let rows = sqlx::query_as::<_, ShowtimeRow>(&query)
            .bind(room_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Showtime::try_from).collect()
    }

    async fn reschedule_showtime(
        &self,
        showtime_id: ShowtimeId,
        expected_version: i64,
        starts_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE showtimes SET starts_at = $3, version = version + 1
             WHERE id = $1 AND version = $2",
        )
        .bind(showtime_id.0)
        .bind(expected_version)
        .bind(starts_at)
        .execute(&self.pool)
        .await
        .map_err(|e| slot_error(e, starts_at))?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::Conflict(showtime_id));
        }
        Ok(())
    }

    async fn delete_showtime(
        &self,
        showtime_id: ShowtimeId,
        expected_version: i64,
        cancelled_at: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM showtimes WHERE id = $1 AND version = $2")
            .bind(showtime_id.0)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(showtime_id));
        }

        // Брони остаются в журнале, только меняют статус
        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET status = 'cancelled', cancelled_at = $2
            WHERE showtime_id = $1 AND status = 'confirmed'
            RETURNING id, user_id, showtime_id, seats, status, created_at, cancelled_at
            "#,
        )
        .bind(showtime_id.0)
        .bind(cancelled_at)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut cancelled = into_bookings(rows)?;
        cancelled.sort_by_key(|b| b.created_at);
        Ok(cancelled)
    }

    async fn commit_reservation(&self, expected_version: i64, booking: &Booking) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // 1) CAS по версии сеанса
        let bumped = sqlx::query("UPDATE showtimes SET version = version + 1 WHERE id = $1 AND version = $2")
            .bind(booking.showtime_id.0)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if bumped == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(booking.showtime_id));
        }

        // 2) Условный перевод мест: только из available
        let seats = seat_ints(&booking.seats);
        let claimed = sqlx::query(
            r#"
            UPDATE showtime_seats
            SET status = 'booked', booking_id = $2
            WHERE showtime_id = $1 AND seat_number = ANY($3) AND status = 'available'
            "#,
        )
        .bind(booking.showtime_id.0)
        .bind(booking.id.0)
        .bind(&seats)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if claimed != seats.len() as u64 {
            debug!(
                "claimed {} of {} seats for showtime {}, rolling back",
                claimed,
                seats.len(),
                booking.showtime_id
            );
            tx.rollback().await?;
            return Err(StoreError::Conflict(booking.showtime_id));
        }

        // 3) Запись в журнал
        sqlx::query(
            "INSERT INTO bookings (id, user_id, showtime_id, seats, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(booking.id.0)
        .bind(booking.user_id.as_ref().map(|u| u.as_str()))
        .bind(booking.showtime_id.0)
        .bind(&seats)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit_cancellation(&self, expected_version: i64, cancellation: &Cancellation) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let bumped = sqlx::query("UPDATE showtimes SET version = version + 1 WHERE id = $1 AND version = $2")
            .bind(cancellation.showtime_id.0)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if bumped == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(cancellation.showtime_id));
        }

        let marked = sqlx::query(
            "UPDATE bookings SET status = 'cancelled', cancelled_at = $2
             WHERE id = $1 AND status = 'confirmed'",
        )
        .bind(cancellation.booking_id.0)
        .bind(cancellation.cancelled_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if marked == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(cancellation.showtime_id));
        }

        sqlx::query(
            r#"
            UPDATE showtime_seats
            SET status = 'available', booking_id = NULL
            WHERE showtime_id = $1 AND seat_number = ANY($2) AND booking_id = $3
            "#,
        )
        .bind(cancellation.showtime_id.0)
        .bind(seat_ints(&cancellation.seats))
        .bind(cancellation.booking_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_booking(&self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        let query = format!("{} WHERE id = $1", BOOKING_SELECT);
        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(booking_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Booking>> {
        let query = format!("{} WHERE user_id = $1 ORDER BY created_at DESC", BOOKING_SELECT);
        let rows = sqlx::query_as::<_, BookingRow>(&query)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        into_bookings(rows)
    }

    async fn list_bookings_by_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Booking>> {
        let query = format!("{} WHERE showtime_id = $1 ORDER BY created_at DESC", BOOKING_SELECT);
        let rows = sqlx::query_as::<_, BookingRow>(&query)
            .bind(showtime_id.0)
            .fetch_all(&self.pool)
            .await?;
        into_bookings(rows)
    }
}
