pub mod geocoding;
pub mod identity;

pub use geocoding::{Coordinate, Geocoder, StaticGeocoder};
pub use identity::{ContactSnapshot, Principal, Role};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
    #[error("Geocoding failed: {0}")]
    GeocodingError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
