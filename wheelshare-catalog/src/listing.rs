use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wheelshare_core::{Coordinate, Principal, Role};
use wheelshare_shared::Masked;

/// A car offered for rent by one owner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: String,
    pub owner_email: Masked<String>,
    pub car_model: String,
    pub license_plate: String,
    pub photo_url: String,
    /// Price per day in minor currency units
    pub daily_price_cents: i64,
    /// Number of bookings the listing can hold at once
    pub capacity: u32,
    pub city: String,
    pub address: String,
    pub coordinate: Option<Coordinate>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    /// Case-insensitive substring match on the city. A blank query matches everything.
    pub fn matches_city(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }
        self.city.to_lowercase().contains(&query.to_lowercase())
    }

    /// Text handed to the geocoder
    pub fn geocode_query(&self) -> String {
        format!("{}, {}", self.address, self.city)
    }
}

fn default_capacity() -> u32 {
    1
}

/// Owner-submitted listing form
#[derive(Debug, Clone, Deserialize)]
pub struct NewListing {
    pub car_model: String,
    pub license_plate: String,
    pub daily_price_cents: i64,
    pub photo_url: String,
    pub city: String,
    pub address: String,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

impl NewListing {
    /// Check the form and turn it into a listing owned by `owner`.
    pub fn validate(self, owner: &Principal) -> CatalogResult<Listing> {
        owner
            .require_role(Role::Owner)
            .map_err(|_| CatalogError::Unauthorized("Only registered owners can create listings".to_string()))?;

        let fields = [
            ("car_model", &self.car_model),
            ("license_plate", &self.license_plate),
            ("photo_url", &self.photo_url),
            ("city", &self.city),
            ("address", &self.address),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(CatalogError::Validation(format!("{} is required", name)));
            }
        }

        if self.daily_price_cents <= 0 {
            return Err(CatalogError::Validation("daily price must be a positive amount".to_string()));
        }

        let photo_url = self.photo_url.trim();
        if !(photo_url.starts_with("http://") || photo_url.starts_with("https://")) {
            return Err(CatalogError::Validation(
                "photo_url must start with http:// or https://".to_string(),
            ));
        }

        if self.capacity == 0 {
            return Err(CatalogError::Validation("capacity must be at least 1".to_string()));
        }

        Ok(Listing {
            id: Uuid::new_v4(),
            owner_id: owner.subject.clone(),
            owner_email: owner.email.clone(),
            car_model: self.car_model.trim().to_string(),
            license_plate: self.license_plate.trim().to_string(),
            photo_url: photo_url.to_string(),
            daily_price_cents: self.daily_price_cents,
            capacity: self.capacity,
            city: self.city.trim().to_string(),
            address: self.address.trim().to_string(),
            coordinate: None,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Listing not found: {0}")]
    NotFound(Uuid),

    #[error("Listing already exists: {0}")]
    Duplicate(Uuid),

    #[error("Invalid listing: {0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Listing store unavailable: {0}")]
    Unavailable(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
