use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;
use wheelshare_booking::Booking;
use wheelshare_catalog::{build_map_view, Listing, MapView, NewListing};
use wheelshare_core::{Principal, Role};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CitySearch {
    pub city: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/listings", get(search_listings).post(create_listing))
        .route("/listings/mine", get(my_listings))
        .route("/listings/{id}/bookings", get(active_bookings))
        .route("/listings/{id}/history", get(booking_history))
        .route("/listings/{id}/stream", get(listing_stream))
        .route("/map", get(map_view))
}

async fn create_listing(
    State(state): State<AppState>,
    Extension(owner): Extension<Principal>,
    Json(form): Json<NewListing>,
) -> Result<(StatusCode, Json<Listing>), AppError> {
    let mut listing = form.validate(&owner)?;

    // Stored so the map does not geocode it again. Failure only costs a pin.
    match state.geocoder.geocode(&listing.geocode_query()).await {
        Ok(coordinate) => listing.coordinate = Some(coordinate),
        Err(e) => tracing::warn!("Could not geocode listing {}: {}", listing.id, e),
    }

    state.listings.create_listing(&listing).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn search_listings(
    State(state): State<AppState>,
    Query(search): Query<CitySearch>,
) -> Result<Json<Vec<Listing>>, AppError> {
    let listings = state.listings.search_by_city(search.city.as_deref()).await?;
    Ok(Json(listings))
}

async fn my_listings(
    State(state): State<AppState>,
    Extension(owner): Extension<Principal>,
) -> Result<Json<Vec<Listing>>, AppError> {
    owner.require_role(Role::Owner)?;
    let listings = state.listings.listings_by_owner(&owner.subject).await?;
    Ok(Json(listings))
}

async fn load_listing(state: &AppState, id: Uuid) -> Result<Listing, AppError> {
    state
        .listings
        .get_listing(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Listing {} not found", id)))
}

async fn active_bookings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Booking>>, AppError> {
    load_listing(&state, id).await?;
    let bookings = state.coordinator.get_active_bookings_for_listing(id).await?;
    Ok(Json(bookings))
}

async fn booking_history(
    State(state): State<AppState>,
    Extension(owner): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Booking>>, AppError> {
    owner.require_role(Role::Owner)?;
    let listing = load_listing(&state, id).await?;
    if listing.owner_id != owner.subject {
        return Err(AppError::AuthorizationError("Only the listing owner can view its history".to_string()));
    }

    let history = state.coordinator.get_booking_history_for_listing(id).await?;
    Ok(Json(history))
}

async fn listing_stream(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    load_listing(&state, listing_id).await?;
    let rx = state.coordinator.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.listing_id() == listing_id => Event::default()
                .event(event.name())
                .json_data(&event)
                .ok()
                .map(Ok::<_, Infallible>),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Event stream for listing {} fell behind: {}", listing_id, e);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn map_view(State(state): State<AppState>, Query(search): Query<CitySearch>) -> Result<Json<MapView>, AppError> {
    let listings = state.listings.search_by_city(search.city.as_deref()).await?;
    let view = build_map_view(listings, state.geocoder.as_ref()).await;
    Ok(Json(view))
}
