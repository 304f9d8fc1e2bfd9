use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use wheelshare_booking::Booking;
use wheelshare_core::{Principal, Role};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct BookingRequest {
    pub listing_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", delete(cancel_booking))
        .route("/owner/bookings/{id}/cancel", post(owner_cancel_booking))
        .route("/me/booking", get(my_active_booking))
        .route("/me/bookings", get(my_bookings))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(renter): Extension<Principal>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    renter.require_role(Role::Renter)?;

    let result = state.coordinator.request_booking(&renter, req.listing_id).await;
    state.metrics.record_booking(&result);

    Ok((StatusCode::CREATED, Json(result?)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(renter): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    renter.require_role(Role::Renter)?;

    let result = state.coordinator.request_cancellation(&renter.subject, id).await;
    state.metrics.record_cancellation("renter", &result);

    Ok(Json(result?))
}

async fn owner_cancel_booking(
    State(state): State<AppState>,
    Extension(owner): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    owner.require_role(Role::Owner)?;

    let result = state.coordinator.request_owner_cancellation(&owner.subject, id).await;
    state.metrics.record_cancellation("owner", &result);

    Ok(Json(result?))
}

async fn my_active_booking(
    State(state): State<AppState>,
    Extension(renter): Extension<Principal>,
) -> Result<Json<Booking>, AppError> {
    renter.require_role(Role::Renter)?;

    state
        .coordinator
        .get_active_booking_for_renter(&renter.subject)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError("No active booking".to_string()))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(renter): Extension<Principal>,
) -> Result<Json<Vec<Booking>>, AppError> {
    renter.require_role(Role::Renter)?;
    let history = state.coordinator.get_booking_history_for_renter(&renter.subject).await?;
    Ok(Json(history))
}
