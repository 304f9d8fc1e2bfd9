use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;
use wheelshare_shared::CancellationCause;

use crate::models::{Booking, ConfirmationCode};

/// Preconditions a commit is checked against, as observed by the caller's reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitGuard {
    pub renter_id: String,
    /// The renter's active booking when the caller looked. Superseded by the commit.
    pub expected_active: Option<Uuid>,
    pub listing_id: Uuid,
    pub capacity: u32,
}

/// An all-or-nothing write: retire the renter's previous booking (if any) and
/// insert the new one.
#[derive(Debug, Clone)]
pub struct BookingChange {
    pub guard: CommitGuard,
    pub booking: Booking,
}

impl BookingChange {
    pub fn new(booking: Booking, previous: Option<&Booking>, capacity: u32) -> Self {
        Self {
            guard: CommitGuard {
                renter_id: booking.renter_id.clone(),
                expected_active: previous.map(|b| b.id),
                listing_id: booking.listing_id,
                capacity,
            },
            booking,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub booking: Booking,
    pub superseded: Option<Booking>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Cancelled(Booking),
    AlreadyCancelled(Booking),
}

impl CancelOutcome {
    pub fn into_booking(self) -> Booking {
        match self {
            CancelOutcome::Cancelled(b) | CancelOutcome::AlreadyCancelled(b) => b,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Confirmation code already issued: {0}")]
    DuplicateConfirmationCode(String),

    #[error("Booking already recorded: {0}")]
    AlreadyCommitted(Uuid),

    #[error("Active booking for renter {renter_id} changed since it was read")]
    StaleRenterState { renter_id: String },

    #[error("Listing {listing_id} is at capacity ({capacity})")]
    CapacityExceeded { listing_id: Uuid, capacity: u32 },

    #[error("Malformed change: {0}")]
    InvalidChange(String),

    #[error("Ledger indexes are inconsistent: {0}")]
    Corrupted(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Durable store of booking records, indexed by listing and by renter.
///
/// Enforces record-level rules only (code uniqueness, existence, the
/// `active -> cancelled` transition). Cross-record rules reach it as
/// [`CommitGuard`]s.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn get(&self, id: Uuid) -> LedgerResult<Option<Booking>>;

    async fn active_booking_for_renter(&self, renter_id: &str) -> LedgerResult<Option<Booking>>;

    async fn active_bookings_for_listing(&self, listing_id: Uuid) -> LedgerResult<Vec<Booking>>;

    /// Every booking ever made on the listing, oldest first
    async fn history_for_listing(&self, listing_id: Uuid) -> LedgerResult<Vec<Booking>>;

    /// Every booking the renter ever made, oldest first
    async fn history_for_renter(&self, renter_id: &str) -> LedgerResult<Vec<Booking>>;

    async fn insert(&self, booking: Booking) -> LedgerResult<()>;

    /// Idempotent: cancelling a cancelled booking reports `AlreadyCancelled`.
    async fn cancel(&self, id: Uuid, cause: CancellationCause) -> LedgerResult<CancelOutcome>;

    /// Apply `change` atomically if its guard still holds.
    async fn commit(&self, change: BookingChange) -> LedgerResult<CommitOutcome>;
}

/// Rejects changes the coordinator should never build.
pub fn check_change_shape(change: &BookingChange) -> LedgerResult<()> {
    let booking = &change.booking;
    if !booking.is_active() {
        return Err(LedgerError::InvalidChange(format!("booking {} is not active", booking.id)));
    }
    if booking.listing_id != change.guard.listing_id {
        return Err(LedgerError::InvalidChange("guard and booking disagree on listing".to_string()));
    }
    if booking.renter_id != change.guard.renter_id {
        return Err(LedgerError::InvalidChange("guard and booking disagree on renter".to_string()));
    }
    Ok(())
}

#[derive(Default)]
struct LedgerState {
    bookings: HashMap<Uuid, Booking>,
    codes: HashMap<ConfirmationCode, Uuid>,
    // Sets rather than single pointers so a violation is visible instead of overwritten.
    active_by_renter: HashMap<String, HashSet<Uuid>>,
    active_by_listing: HashMap<Uuid, HashSet<Uuid>>,
    history_by_listing: HashMap<Uuid, Vec<Uuid>>,
    history_by_renter: HashMap<String, Vec<Uuid>>,
}

impl LedgerState {
    fn check_insertable(&self, booking: &Booking) -> LedgerResult<()> {
        if self.bookings.contains_key(&booking.id) {
            return Err(LedgerError::AlreadyCommitted(booking.id));
        }
        if self.codes.contains_key(&booking.confirmation_code) {
            return Err(LedgerError::DuplicateConfirmationCode(
                booking.confirmation_code.to_string(),
            ));
        }
        Ok(())
    }

    fn add(&mut self, booking: Booking) {
        let id = booking.id;
        if booking.is_active() {
            self.active_by_renter
                .entry(booking.renter_id.clone())
                .or_default()
                .insert(id);
            self.active_by_listing
                .entry(booking.listing_id)
                .or_default()
                .insert(id);
        }
        self.history_by_listing
            .entry(booking.listing_id)
            .or_default()
            .push(id);
        self.history_by_renter
            .entry(booking.renter_id.clone())
            .or_default()
            .push(id);
        self.codes.insert(booking.confirmation_code.clone(), id);
        self.bookings.insert(id, booking);
    }

    fn retire(&mut self, id: Uuid, cause: CancellationCause) -> LedgerResult<CancelOutcome> {
        let booking = self.bookings.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        if !booking.cancel(cause) {
            return Ok(CancelOutcome::AlreadyCancelled(booking.clone()));
        }

        let snapshot = booking.clone();
        if let Some(active) = self.active_by_renter.get_mut(&snapshot.renter_id) {
            active.remove(&id);
            if active.is_empty() {
                self.active_by_renter.remove(&snapshot.renter_id);
            }
        }
        if let Some(active) = self.active_by_listing.get_mut(&snapshot.listing_id) {
            active.remove(&id);
        }
        Ok(CancelOutcome::Cancelled(snapshot))
    }

    fn active_for_renter(&self, renter_id: &str) -> LedgerResult<Option<&Booking>> {
        let Some(ids) = self.active_by_renter.get(renter_id) else {
            return Ok(None);
        };
        if ids.len() > 1 {
            return Err(LedgerError::Corrupted(format!(
                "renter {} has {} active bookings",
                renter_id,
                ids.len()
            )));
        }
        Ok(ids.iter().next().and_then(|id| self.bookings.get(id)))
    }

    fn active_on_listing(&self, listing_id: Uuid) -> Vec<Booking> {
        let mut active: Vec<Booking> = self
            .active_by_listing
            .get(&listing_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bookings.get(id).cloned())
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        active
    }

    fn collect(&self, ids: Option<&Vec<Uuid>>) -> Vec<Booking> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.bookings.get(id).cloned())
            .collect()
    }
}

/// Single-process ledger.
///
/// Reads share an `RwLock`; every mutation, including the whole of a
/// [`BookingChange`], runs under the one write lock. That makes commits
/// trivially atomic and also makes the write lock a global serialisation
/// point: fine for one process, not a design for horizontal scale.
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingLedger for InMemoryLedger {
    async fn get(&self, id: Uuid) -> LedgerResult<Option<Booking>> {
        Ok(self.state.read().await.bookings.get(&id).cloned())
    }

    async fn active_booking_for_renter(&self, renter_id: &str) -> LedgerResult<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state.active_for_renter(renter_id)?.cloned())
    }

    async fn active_bookings_for_listing(&self, listing_id: Uuid) -> LedgerResult<Vec<Booking>> {
        Ok(self.state.read().await.active_on_listing(listing_id))
    }

    async fn history_for_listing(&self, listing_id: Uuid) -> LedgerResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(state.collect(state.history_by_listing.get(&listing_id)))
    }

    async fn history_for_renter(&self, renter_id: &str) -> LedgerResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(state.collect(state.history_by_renter.get(renter_id)))
    }

    async fn insert(&self, booking: Booking) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        state.check_insertable(&booking)?;
        state.add(booking);
        Ok(())
    }

    async fn cancel(&self, id: Uuid, cause: CancellationCause) -> LedgerResult<CancelOutcome> {
        self.state.write().await.retire(id, cause)
    }

    async fn commit(&self, change: BookingChange) -> LedgerResult<CommitOutcome> {
        check_change_shape(&change)?;
        let BookingChange { guard, booking } = change;

        let mut state = self.state.write().await;

        // Every check runs before the first mutation.
        if state.bookings.contains_key(&booking.id) {
            return Err(LedgerError::AlreadyCommitted(booking.id));
        }

        let current = state.active_for_renter(&guard.renter_id)?.map(|b| (b.id, b.listing_id));
        if current.map(|(id, _)| id) != guard.expected_active {
            return Err(LedgerError::StaleRenterState {
                renter_id: guard.renter_id,
            });
        }

        let freed_here = matches!(current, Some((_, listing)) if listing == guard.listing_id);
        let occupied = state
            .active_by_listing
            .get(&guard.listing_id)
            .map_or(0, HashSet::len)
            .saturating_sub(usize::from(freed_here));
        if occupied >= guard.capacity as usize {
            return Err(LedgerError::CapacityExceeded {
                listing_id: guard.listing_id,
                capacity: guard.capacity,
            });
        }

        state.check_insertable(&booking)?;

        let superseded = match guard.expected_active {
            Some(previous) => match state.retire(previous, CancellationCause::Superseded)? {
                CancelOutcome::Cancelled(b) => Some(b),
                CancelOutcome::AlreadyCancelled(b) => {
                    return Err(LedgerError::Corrupted(format!(
                        "booking {} indexed as active but already cancelled",
                        b.id
                    )))
                }
            },
            None => None,
        };

        state.add(booking.clone());

        Ok(CommitOutcome { booking, superseded })
    }
}
