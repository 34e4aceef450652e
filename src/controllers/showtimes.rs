use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::BookingError;
use crate::middleware::AuthUser;
use crate::models::{BookingId, MovieId, RoomId, SeatNumber, SeatStatus, SeatVector, Showtime, ShowtimeId};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showtimes", post(create_showtime))
        .route(
            "/showtimes/{id}",
            get(get_showtime).patch(reschedule_showtime).delete(delete_showtime),
        )
        .route("/showtimes/{id}/seats", get(get_seats))
        .route("/showtimes/{id}/bookings", get(get_showtime_bookings))
}

/* ---------- DTO ---------- */

#[derive(Debug, Serialize, Deserialize)]
pub struct SeatStatusEntry {
    pub seat_number: SeatNumber,
    pub status: SeatStatus,
}

fn seat_entries(seats: &SeatVector) -> Vec<SeatStatusEntry> {
    seats
        .iter()
        .map(|(seat_number, status)| SeatStatusEntry { seat_number, status })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShowtimeResponse {
    pub id: ShowtimeId,
    pub room_id: RoomId,
    pub movie_id: MovieId,
    pub starts_at: DateTime<Utc>,
    pub available: usize,
    pub booked: usize,
    pub seats: Vec<SeatStatusEntry>,
}

impl From<&Showtime> for ShowtimeResponse {
    fn from(s: &Showtime) -> Self {
        let booked = s.seats.booked().len();
        Self {
            id: s.id,
            room_id: s.room_id,
            movie_id: s.movie_id,
            starts_at: s.starts_at,
            available: s.seats.len() - booked,
            booked,
            seats: seat_entries(&s.seats),
        }
    }
}

/* ---------- SHOWTIMES ---------- */

#[derive(Debug, Deserialize)]
struct CreateShowtimeRequest {
    pub room_id: RoomId,
    pub movie_id: MovieId,
    pub starts_at: DateTime<Utc>,
}

// POST /api/showtimes
async fn create_showtime(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateShowtimeRequest>,
) -> Result<impl IntoResponse, BookingError> {
    user.require_admin()?;
    let id = state.registry.create(req.room_id, req.movie_id, req.starts_at).await?;
    let showtime = state.registry.get(id).await?;
    Ok((StatusCode::CREATED, Json(ShowtimeResponse::from(&showtime))))
}

// GET /api/showtimes/{id}
async fn get_showtime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ShowtimeId>,
) -> Result<impl IntoResponse, BookingError> {
    let showtime = state.registry.get(id).await?;
    Ok(Json(ShowtimeResponse::from(&showtime)))
}

#[derive(Debug, Deserialize)]
struct RescheduleRequest {
    pub starts_at: DateTime<Utc>,
}

// PATCH /api/showtimes/{id}
async fn reschedule_showtime(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<ShowtimeId>,
    Json(req): Json<RescheduleRequest>,
) -> Result<impl IntoResponse, BookingError> {
    user.require_admin()?;
    let showtime = state.registry.update(id, req.starts_at).await?;
    Ok(Json(ShowtimeResponse::from(&showtime)))
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    pub id: ShowtimeId,
    pub cancelled_bookings: Vec<BookingId>,
}

// DELETE /api/showtimes/{id}?force=true
async fn delete_showtime(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<ShowtimeId>,
    Query(params): Query<DeleteParams>,
) -> Result<impl IntoResponse, BookingError> {
    user.require_admin()?;
    let cancelled = state.registry.delete(id, params.force).await?;
    Ok(Json(DeleteResponse {
        id,
        cancelled_bookings: cancelled.iter().map(|b| b.id).collect(),
    }))
}

/* ---------- SEATS ---------- */

// GET /api/showtimes/{id}/seats
async fn get_seats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ShowtimeId>,
) -> Result<impl IntoResponse, BookingError> {
    let seats = state.queries.seat_status(id).await?;
    Ok(Json(seat_entries(&seats)))
}

// GET /api/showtimes/{id}/bookings
async fn get_showtime_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<ShowtimeId>,
) -> Result<impl IntoResponse, BookingError> {
    user.require_admin()?;
    // существование сеанса, иначе пустой список неотличим от 404
    state.registry.get(id).await?;
    Ok(Json(state.queries.bookings_for_showtime(id).await?))
}
