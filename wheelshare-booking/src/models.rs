use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use wheelshare_core::{ContactSnapshot, Principal};
use wheelshare_shared::CancellationCause;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "ACTIVE",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(BookingStatus::Active),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

/// Human-readable code the renter quotes at pickup. Uppercase ASCII letters and digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationCode(String);

impl ConfirmationCode {
    pub const MIN_LEN: usize = 4;
    pub const MAX_LEN: usize = 16;

    pub fn parse(value: &str) -> Option<Self> {
        let valid_len = (Self::MIN_LEN..=Self::MAX_LEN).contains(&value.len());
        let valid_chars = value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());

        if valid_len && valid_chars {
            Some(Self(value.to_string()))
        } else {
            None
        }
    }

    /// Codes built from `ALPHABET` within the length bounds skip re-validation.
    pub(crate) fn from_generated(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cancellation {
    pub cause: CancellationCause,
    pub cancelled_at: DateTime<Utc>,
}

/// A renter's reservation of a listing.
///
/// One canonical record; the ledger indexes it by listing and by renter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub renter_id: String,
    pub renter_contact: ContactSnapshot,
    pub confirmation_code: ConfirmationCode,
    pub status: BookingStatus,
    pub cancellation: Option<Cancellation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(listing_id: Uuid, renter: &Principal, confirmation_code: ConfirmationCode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            listing_id,
            renter_id: renter.subject.clone(),
            renter_contact: renter.contact(),
            confirmation_code,
            status: BookingStatus::Active,
            cancellation: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }

    /// Move to `Cancelled`. Returns false, leaving the record untouched, if it
    /// was already cancelled.
    pub fn cancel(&mut self, cause: CancellationCause) -> bool {
        if !self.is_active() {
            return false;
        }

        let now = Utc::now();
        self.status = BookingStatus::Cancelled;
        self.cancellation = Some(Cancellation {
            cause,
            cancelled_at: now,
        });
        self.updated_at = now;
        true
    }
}
