use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::BookingError;
use crate::middleware::AuthUser;
use crate::models::{BookingId, ShowtimeId};
use crate::services::ReserveRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(get_user_bookings).post(create_booking))
        .route("/bookings/cancel", patch(cancel_booking))
        .route("/bookings/{id}", get(get_booking))
}

/* ---------- BOOKINGS ---------- */

// POST /api/bookings
#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    pub showtime_id: ShowtimeId,
    pub seats: Vec<i32>,
    /// Бронь без владельца (касса); только для администратора.
    #[serde(default)]
    pub guest: bool,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let user_id = if req.guest {
        user.require_admin()?;
        None
    } else {
        Some(user.actor().user_id.clone())
    };

    let booking = state
        .engine
        .reserve(ReserveRequest::new(req.showtime_id, req.seats, user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings
async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.queries.bookings_for_user(&user.actor().user_id).await?))
}

// GET /api/bookings/{id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<BookingId>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.queries.booking(id, user.actor()).await?))
}

// PATCH /api/bookings/cancel
#[derive(Debug, Deserialize)]
struct CancelBookingRequest {
    pub booking_id: BookingId,
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CancelBookingRequest>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.engine.cancel(req.booking_id, user.actor()).await?))
}
