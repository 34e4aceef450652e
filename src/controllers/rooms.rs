use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::showtimes::ShowtimeResponse;
use super::validated;
use crate::error::BookingError;
use crate::middleware::AuthUser;
use crate::models::{RoomId, Seat, SeatKind};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{room_id}/seats", get(room_seats))
        .route("/rooms/{room_id}/showtimes", get(room_showtimes))
}

/* ---------- ROOMS ---------- */

#[derive(Debug, Deserialize, Validate)]
struct CreateRoomRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 2000), nested)]
    pub seats: Vec<SeatInput>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct SeatInput {
    #[validate(range(min = 1))]
    pub number: i32,
    #[validate(length(max = 16))]
    pub label: Option<String>,
    pub kind: Option<String>,
}

// POST /api/rooms
async fn create_room(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, BookingError> {
    user.require_admin()?;
    let req = validated(req)?;

    let seats = req
        .seats
        .into_iter()
        .map(|s| {
            let label = s.label.unwrap_or_else(|| s.number.to_string());
            let kind = s.kind.as_deref().map(SeatKind::parse).unwrap_or_default();
            Seat::new(s.number, label, kind)
        })
        .collect();

    let room = state.seat_map.add_room(req.name, seats).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

// GET /api/rooms
async fn list_rooms(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.seat_map.list_rooms().await?))
}

// GET /api/rooms/{room_id}/seats
async fn room_seats(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.seat_map.get_room(room_id).await?.seats))
}

// GET /api/rooms/{room_id}/showtimes
async fn room_showtimes(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Result<impl IntoResponse, BookingError> {
    let showtimes = state.registry.list_by_room(room_id).await?;
    Ok(Json(showtimes.iter().map(ShowtimeResponse::from).collect::<Vec<_>>()))
}
