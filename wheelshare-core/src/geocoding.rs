use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Downtown Toronto, where the map opens when nothing else is known.
    pub const DEFAULT_CENTER: Coordinate = Coordinate {
        latitude: 43.6532,
        longitude: -79.3832,
    };
}

/// External address resolution. Used for display only; booking never waits on it.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> CoreResult<Coordinate>;
}

/// Lookup-table geocoder for local runs and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticGeocoder {
    entries: HashMap<String, Coordinate>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, address: &str, coordinate: Coordinate) -> Self {
        self.entries.insert(normalize(address), coordinate);
        self
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, address: &str) -> CoreResult<Coordinate> {
        tracing::debug!("Geocoding address: {}", address);

        self.entries
            .get(&normalize(address))
            .copied()
            .ok_or_else(|| CoreError::GeocodingError(format!("no match for '{}'", address)))
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_lowercase()
}
