use futures_util::future::join_all;
use serde::Serialize;
use uuid::Uuid;
use wheelshare_core::{Coordinate, Geocoder};

use crate::listing::Listing;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MapPin {
    pub listing_id: Uuid,
    pub car_model: String,
    pub daily_price_cents: i64,
    pub city: String,
    pub address: String,
    pub coordinate: Coordinate,
}

/// What the renter map screen renders
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MapView {
    pub center: Coordinate,
    pub pins: Vec<MapPin>,
}

/// Resolve every listing to a pin. Listings that cannot be located are left
/// off the map; they stay bookable.
pub async fn build_map_view(listings: Vec<Listing>, geocoder: &dyn Geocoder) -> MapView {
    let located = join_all(listings.into_iter().map(|listing| async move {
        let coordinate = match listing.coordinate {
            Some(coordinate) => coordinate,
            None => match geocoder.geocode(&listing.geocode_query()).await {
                Ok(coordinate) => coordinate,
                Err(e) => {
                    tracing::warn!("Leaving listing {} off the map: {}", listing.id, e);
                    return None;
                }
            },
        };

        Some(MapPin {
            listing_id: listing.id,
            car_model: listing.car_model,
            daily_price_cents: listing.daily_price_cents,
            city: listing.city,
            address: listing.address,
            coordinate,
        })
    }))
    .await;

    let pins: Vec<MapPin> = located.into_iter().flatten().collect();
    let center = pins
        .first()
        .map(|pin| pin.coordinate)
        .unwrap_or(Coordinate::DEFAULT_CENTER);

    MapView { center, pins }
}
