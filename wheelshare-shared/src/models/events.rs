use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a booking left the active state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationCause {
    /// The renter cancelled it.
    Renter,
    /// Replaced by the same renter's newer booking.
    Superseded,
    /// The listing owner cancelled it.
    Owner,
}

impl CancellationCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationCause::Renter => "RENTER",
            CancellationCause::Superseded => "SUPERSEDED",
            CancellationCause::Owner => "OWNER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RENTER" => Some(CancellationCause::Renter),
            "SUPERSEDED" => Some(CancellationCause::Superseded),
            "OWNER" => Some(CancellationCause::Owner),
            _ => None,
        }
    }
}

/// Published after every committed booking state change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    Confirmed {
        booking_id: Uuid,
        listing_id: Uuid,
        renter_id: String,
        confirmation_code: String,
        timestamp: i64,
    },
    Cancelled {
        booking_id: Uuid,
        listing_id: Uuid,
        renter_id: String,
        cause: CancellationCause,
        timestamp: i64,
    },
}

impl BookingEvent {
    pub fn listing_id(&self) -> Uuid {
        match self {
            BookingEvent::Confirmed { listing_id, .. } => *listing_id,
            BookingEvent::Cancelled { listing_id, .. } => *listing_id,
        }
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            BookingEvent::Confirmed { booking_id, .. } => *booking_id,
            BookingEvent::Cancelled { booking_id, .. } => *booking_id,
        }
    }

    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::Confirmed { .. } => "booking_confirmed",
            BookingEvent::Cancelled { .. } => "booking_cancelled",
        }
    }
}
