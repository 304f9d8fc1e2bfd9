use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wheelshare_catalog::ListingRepository;
use wheelshare_core::Principal;
use wheelshare_shared::{BookingEvent, CancellationCause};

use crate::codes::CodeGenerator;
use crate::error::{BookingError, BookingResult, ErrorKind};
use crate::ledger::{BookingChange, BookingLedger, CancelOutcome, CommitOutcome, LedgerError};
use crate::models::Booking;
use crate::retry::{retry_transient, Backoff};

/// Bounds on the coordinator's internal retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorPolicy {
    /// Confirmation codes tried before giving up on a booking
    pub code_attempts: u32,
    /// Read-decide-commit rounds lost to concurrent changes of the same renter
    pub stale_read_rounds: u32,
    /// Retries of a single store call that failed transiently
    pub backoff: Backoff,
}

impl Default for CoordinatorPolicy {
    fn default() -> Self {
        Self {
            code_attempts: 8,
            stale_read_rounds: 16,
            backoff: Backoff {
                retries: 3,
                base: Duration::from_millis(25),
                max: Duration::from_millis(400),
            },
        }
    }
}

const EVENT_BUFFER: usize = 256;

/// The only writer of booking state.
///
/// Each request reads the renter's active booking and the listing's active
/// set, decides, and submits one guarded [`BookingChange`]. The ledger either
/// applies the whole change or rejects it; on a stale guard the coordinator
/// reads again and re-decides.
pub struct BookingCoordinator {
    listings: Arc<dyn ListingRepository>,
    ledger: Arc<dyn BookingLedger>,
    codes: Arc<dyn CodeGenerator>,
    policy: CoordinatorPolicy,
    events: broadcast::Sender<BookingEvent>,
}

impl BookingCoordinator {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        ledger: Arc<dyn BookingLedger>,
        codes: Arc<dyn CodeGenerator>,
        policy: CoordinatorPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            listings,
            ledger,
            codes,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> &CoordinatorPolicy {
        &self.policy
    }

    /// Committed booking changes. The events of one commit arrive in order,
    /// a superseded cancellation before the new confirmation. Events from
    /// concurrent commits may interleave.
    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    /// Book `listing_id` for `renter`, superseding the renter's booking on any
    /// other listing in the same commit.
    pub async fn request_booking(&self, renter: &Principal, listing_id: Uuid) -> BookingResult<Booking> {
        self.book(renter, listing_id).await.map_err(escalate)
    }

    async fn book(&self, renter: &Principal, listing_id: Uuid) -> BookingResult<Booking> {
        let listings = self.listings.as_ref();
        let ledger = self.ledger.as_ref();
        let backoff = &self.policy.backoff;
        let renter_id = renter.subject.as_str();

        let listing = retry_transient(backoff, "load listing", move || listings.get_listing(listing_id))
            .await?
            .ok_or(BookingError::ListingNotFound(listing_id))?;
        let capacity = listing.capacity;

        let mut code = self.codes.generate();
        let mut code_attempts = 1;
        let mut stale_rounds = 0;

        loop {
            let previous = retry_transient(backoff, "read renter booking", move || {
                ledger.active_booking_for_renter(renter_id)
            })
            .await?;

            if let Some(previous) = &previous {
                if previous.listing_id == listing_id {
                    return Err(BookingError::AlreadyBooked {
                        listing_id,
                        booking_id: previous.id,
                    });
                }
            }

            let occupied = retry_transient(backoff, "read listing bookings", move || {
                ledger.active_bookings_for_listing(listing_id)
            })
            .await?
            .len();

            if occupied > capacity as usize {
                return Err(BookingError::Invariant(format!(
                    "listing {} holds {} active bookings, capacity {}",
                    listing_id, occupied, capacity
                )));
            }
            if occupied >= capacity as usize {
                info!("Listing {} is full, rejecting renter {}", listing_id, renter_id);
                return Err(BookingError::ListingFull(listing_id));
            }

            let booking = Booking::new(listing_id, renter, code.clone());
            let change = BookingChange::new(booking, previous.as_ref(), capacity);

            let committed = retry_transient(backoff, "commit booking", move || ledger.commit(change.clone())).await;

            match committed {
                Ok(outcome) => {
                    self.announce_commit(&outcome);
                    return Ok(outcome.booking);
                }
                Err(LedgerError::AlreadyCommitted(id)) => {
                    // An earlier attempt of this commit landed before its failure was reported.
                    info!("Booking {} was already recorded, returning it", id);
                    let outcome = self.reload_commit(id, previous.as_ref()).await?;
                    self.announce_commit(&outcome);
                    return Ok(outcome.booking);
                }
                Err(LedgerError::DuplicateConfirmationCode(taken)) => {
                    if code_attempts >= self.policy.code_attempts {
                        return Err(BookingError::CodeGenerationExhausted(code_attempts));
                    }
                    warn!("Confirmation code {} already issued, drawing another", taken);
                    code = self.codes.generate();
                    code_attempts += 1;
                }
                Err(LedgerError::CapacityExceeded { .. }) => {
                    info!("Listing {} filled by a concurrent booking", listing_id);
                    return Err(BookingError::ListingFull(listing_id));
                }
                Err(LedgerError::StaleRenterState { .. }) => {
                    stale_rounds += 1;
                    if stale_rounds >= self.policy.stale_read_rounds {
                        return Err(BookingError::Transient(format!(
                            "renter {} changed {} times during one booking request",
                            renter_id, stale_rounds
                        )));
                    }
                    debug!("Renter {} changed under us, re-reading", renter_id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Cancel one of the caller's own bookings. Cancelling twice is a success.
    pub async fn request_cancellation(&self, renter_id: &str, booking_id: Uuid) -> BookingResult<Booking> {
        self.cancel_for_renter(renter_id, booking_id).await.map_err(escalate)
    }

    /// Cancel a booking on one of the caller's listings.
    pub async fn request_owner_cancellation(&self, owner_id: &str, booking_id: Uuid) -> BookingResult<Booking> {
        self.cancel_for_owner(owner_id, booking_id).await.map_err(escalate)
    }

    async fn cancel_for_renter(&self, renter_id: &str, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        if booking.renter_id != renter_id {
            warn!("Renter {} tried to cancel booking {} of another renter", renter_id, booking_id);
            return Err(BookingError::NotOwner(booking_id));
        }
        self.retire(booking, CancellationCause::Renter).await
    }

    async fn cancel_for_owner(&self, owner_id: &str, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        let listings = self.listings.as_ref();
        let listing_id = booking.listing_id;
        let listing = retry_transient(&self.policy.backoff, "load listing", move || {
            listings.get_listing(listing_id)
        })
        .await?
        .ok_or(BookingError::ListingNotFound(listing_id))?;

        if listing.owner_id != owner_id {
            warn!("Owner {} tried to cancel booking {} on listing {}", owner_id, booking_id, listing_id);
            return Err(BookingError::NotOwner(booking_id));
        }
        self.retire(booking, CancellationCause::Owner).await
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.load_booking(booking_id).await.map_err(escalate)
    }

    pub async fn get_active_booking_for_renter(&self, renter_id: &str) -> BookingResult<Option<Booking>> {
        let ledger = self.ledger.as_ref();
        retry_transient(&self.policy.backoff, "read renter booking", move || {
            ledger.active_booking_for_renter(renter_id)
        })
        .await
        .map_err(|e| escalate(e.into()))
    }

    pub async fn get_active_bookings_for_listing(&self, listing_id: Uuid) -> BookingResult<Vec<Booking>> {
        let ledger = self.ledger.as_ref();
        retry_transient(&self.policy.backoff, "read listing bookings", move || {
            ledger.active_bookings_for_listing(listing_id)
        })
        .await
        .map_err(|e| escalate(e.into()))
    }

    /// Owner view: every booking on the listing, cancelled ones included.
    pub async fn get_booking_history_for_listing(&self, listing_id: Uuid) -> BookingResult<Vec<Booking>> {
        let ledger = self.ledger.as_ref();
        retry_transient(&self.policy.backoff, "read listing history", move || {
            ledger.history_for_listing(listing_id)
        })
        .await
        .map_err(|e| escalate(e.into()))
    }

    pub async fn get_booking_history_for_renter(&self, renter_id: &str) -> BookingResult<Vec<Booking>> {
        let ledger = self.ledger.as_ref();
        retry_transient(&self.policy.backoff, "read renter history", move || {
            ledger.history_for_renter(renter_id)
        })
        .await
        .map_err(|e| escalate(e.into()))
    }

    async fn load_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let ledger = self.ledger.as_ref();
        retry_transient(&self.policy.backoff, "load booking", move || ledger.get(booking_id))
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))
    }

    async fn retire(&self, booking: Booking, cause: CancellationCause) -> BookingResult<Booking> {
        if !booking.is_active() {
            debug!("Booking {} already cancelled", booking.id);
            return Ok(booking);
        }

        let ledger = self.ledger.as_ref();
        let booking_id = booking.id;
        let outcome = retry_transient(&self.policy.backoff, "cancel booking", move || {
            ledger.cancel(booking_id, cause)
        })
        .await?;

        match outcome {
            CancelOutcome::Cancelled(booking) => {
                info!(
                    "Booking {} on listing {} cancelled ({})",
                    booking.id,
                    booking.listing_id,
                    cause.as_str()
                );
                self.publish(cancelled_event(&booking, cause));
                Ok(booking)
            }
            CancelOutcome::AlreadyCancelled(booking) => Ok(booking),
        }
    }

    /// Rebuild the outcome of a commit whose reply never arrived.
    async fn reload_commit(&self, id: Uuid, previous: Option<&Booking>) -> BookingResult<CommitOutcome> {
        let ledger = self.ledger.as_ref();
        let backoff = &self.policy.backoff;

        let booking = retry_transient(backoff, "reload booking", move || ledger.get(id))
            .await?
            .ok_or_else(|| BookingError::Invariant(format!("committed booking {} vanished", id)))?;

        let superseded = match previous {
            Some(previous) => {
                let previous_id = previous.id;
                let stored = retry_transient(backoff, "reload superseded booking", move || ledger.get(previous_id))
                    .await?
                    .ok_or_else(|| BookingError::Invariant(format!("superseded booking {} vanished", previous_id)))?;
                match stored.cancellation.as_ref().map(|c| c.cause) {
                    Some(CancellationCause::Superseded) => Some(stored),
                    _ => {
                        return Err(BookingError::Invariant(format!(
                            "booking {} was committed but {} is not marked superseded",
                            id, previous_id
                        )))
                    }
                }
            }
            None => None,
        };

        Ok(CommitOutcome { booking, superseded })
    }

    fn announce_commit(&self, outcome: &CommitOutcome) {
        if let Some(previous) = &outcome.superseded {
            warn!(
                "Booking {} on listing {} superseded by {} for renter {}",
                previous.id, previous.listing_id, outcome.booking.id, previous.renter_id
            );
            self.publish(cancelled_event(previous, CancellationCause::Superseded));
        }

        let booking = &outcome.booking;
        info!(
            "Booking {} confirmed on listing {} ({})",
            booking.id, booking.listing_id, booking.confirmation_code
        );
        self.publish(BookingEvent::Confirmed {
            booking_id: booking.id,
            listing_id: booking.listing_id,
            renter_id: booking.renter_id.clone(),
            confirmation_code: booking.confirmation_code.to_string(),
            timestamp: Utc::now().timestamp(),
        });
    }

    fn publish(&self, event: BookingEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn cancelled_event(booking: &Booking, cause: CancellationCause) -> BookingEvent {
    BookingEvent::Cancelled {
        booking_id: booking.id,
        listing_id: booking.listing_id,
        renter_id: booking.renter_id.clone(),
        cause,
        timestamp: Utc::now().timestamp(),
    }
}

/// Failures that mean a bug or a sizing problem get logged where monitoring sees them.
fn escalate(err: BookingError) -> BookingError {
    match err.kind() {
        ErrorKind::Invariant | ErrorKind::Exhausted => error!("Booking failure needs attention: {}", err),
        _ => {}
    }
    err
}
