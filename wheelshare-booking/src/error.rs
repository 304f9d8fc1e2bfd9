use uuid::Uuid;
use wheelshare_catalog::CatalogError;

use crate::ledger::LedgerError;

/// The broad class of a booking failure. Each class has one user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    Exhausted,
    Transient,
    Invariant,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Exhausted => "EXHAUSTED",
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::Invariant => "INVARIANT",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "That listing or booking could not be found.",
            ErrorKind::Conflict => "This car is not available to book right now.",
            ErrorKind::Unauthorized => "You are not allowed to change this booking.",
            ErrorKind::Exhausted => "We could not issue a confirmation code. Please contact support.",
            ErrorKind::Transient => "The booking service is busy. Please try again in a moment.",
            ErrorKind::Invariant => "Something went wrong with this booking. Our team has been alerted.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Listing not found: {0}")]
    ListingNotFound(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Listing {0} has no remaining capacity")]
    ListingFull(Uuid),

    #[error("Renter already holds booking {booking_id} on listing {listing_id}")]
    AlreadyBooked { listing_id: Uuid, booking_id: Uuid },

    #[error("Booking {0} belongs to another account")]
    NotOwner(Uuid),

    #[error("No unique confirmation code after {0} attempts")]
    CodeGenerationExhausted(u32),

    #[error("Booking store unavailable: {0}")]
    Transient(String),

    #[error("Booking invariant violated: {0}")]
    Invariant(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::ListingNotFound(_) | BookingError::BookingNotFound(_) => ErrorKind::NotFound,
            BookingError::ListingFull(_) | BookingError::AlreadyBooked { .. } => ErrorKind::Conflict,
            BookingError::NotOwner(_) => ErrorKind::Unauthorized,
            BookingError::CodeGenerationExhausted(_) => ErrorKind::Exhausted,
            BookingError::Transient(_) => ErrorKind::Transient,
            BookingError::Invariant(_) => ErrorKind::Invariant,
        }
    }
}

impl From<LedgerError> for BookingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => BookingError::BookingNotFound(id),
            LedgerError::CapacityExceeded { listing_id, .. } => BookingError::ListingFull(listing_id),
            LedgerError::Unavailable(msg) => BookingError::Transient(msg),
            other => BookingError::Invariant(other.to_string()),
        }
    }
}

impl From<CatalogError> for BookingError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => BookingError::ListingNotFound(id),
            CatalogError::Unavailable(msg) => BookingError::Transient(msg),
            other => BookingError::Invariant(other.to_string()),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
