#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use wheelshare_booking::{
    Backoff, Booking, BookingChange, BookingCoordinator, BookingLedger, CancelOutcome, CodeGenerator,
    CommitOutcome, ConfirmationCode, CoordinatorPolicy, InMemoryLedger, LedgerError, LedgerResult,
    RandomCodeGenerator,
};
use wheelshare_catalog::{InMemoryListingStore, Listing, ListingRepository};
use wheelshare_core::{Principal, Role};
use wheelshare_shared::{CancellationCause, Masked};

pub fn fast_policy() -> CoordinatorPolicy {
    CoordinatorPolicy {
        code_attempts: 4,
        stale_read_rounds: 16,
        backoff: Backoff {
            retries: 3,
            base: Duration::from_millis(1),
            max: Duration::from_millis(4),
        },
    }
}

pub fn renter(id: &str) -> Principal {
    Principal::new(id, format!("{}@example.com", id), Role::Renter).with_display_name(id.to_uppercase())
}

pub fn listing(owner_id: &str, capacity: u32) -> Listing {
    Listing {
        id: Uuid::new_v4(),
        owner_id: owner_id.to_string(),
        owner_email: Masked(format!("{}@example.com", owner_id)),
        car_model: "Civic".to_string(),
        license_plate: "ABCD123".to_string(),
        photo_url: "https://img.example.com/civic.jpg".to_string(),
        daily_price_cents: 4_500,
        capacity,
        city: "Toronto".to_string(),
        address: "100 Queen St W".to_string(),
        coordinate: None,
        created_at: Utc::now(),
    }
}

/// Wired coordinator plus direct handles on its stores
pub struct Harness {
    pub coordinator: Arc<BookingCoordinator>,
    pub listings: Arc<InMemoryListingStore>,
    pub ledger: Arc<dyn BookingLedger>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Arc::new(InMemoryLedger::new()), Arc::new(RandomCodeGenerator::default()))
    }

    pub fn with(ledger: Arc<dyn BookingLedger>, codes: Arc<dyn CodeGenerator>) -> Self {
        let listings = Arc::new(InMemoryListingStore::new());
        let coordinator = Arc::new(BookingCoordinator::new(
            listings.clone(),
            ledger.clone(),
            codes,
            fast_policy(),
        ));
        Self {
            coordinator,
            listings,
            ledger,
        }
    }

    pub async fn add_listing(&self, owner_id: &str, capacity: u32) -> Listing {
        let listing = listing(owner_id, capacity);
        self.listings.create_listing(&listing).await.unwrap();
        listing
    }

    pub async fn active_count_for_renter(&self, renter_id: &str) -> usize {
        self.ledger
            .history_for_renter(renter_id)
            .await
            .unwrap()
            .iter()
            .filter(|b| b.is_active())
            .count()
    }
}

/// Hands out the given codes in order, then random ones.
pub struct ScriptedCodes {
    codes: Mutex<VecDeque<&'static str>>,
    fallback: RandomCodeGenerator,
}

impl ScriptedCodes {
    pub fn new(codes: &[&'static str]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().copied().collect()),
            fallback: RandomCodeGenerator::default(),
        }
    }

    /// Always the same code
    pub fn constant(code: &'static str) -> Self {
        Self::new(&[code; 64])
    }
}

impl CodeGenerator for ScriptedCodes {
    fn generate(&self) -> ConfirmationCode {
        match self.codes.lock().unwrap().pop_front() {
            Some(code) => ConfirmationCode::parse(code).unwrap(),
            None => self.fallback.generate(),
        }
    }
}

/// How a [`FlakyLedger`] misbehaves on commit
#[derive(Debug, Clone, Copy)]
pub enum CommitFault {
    /// Fail before touching the state
    Refuse,
    /// Apply the change, then report a failure anyway
    LoseReply,
}

/// Wraps a ledger and fails the first `failures` commits.
pub struct FlakyLedger {
    inner: InMemoryLedger,
    remaining: AtomicU32,
    fault: CommitFault,
    pub commits: AtomicU32,
}

impl FlakyLedger {
    pub fn new(failures: u32, fault: CommitFault) -> Self {
        Self {
            inner: InMemoryLedger::new(),
            remaining: AtomicU32::new(failures),
            fault,
            commits: AtomicU32::new(0),
        }
    }

    fn take_failure(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BookingLedger for FlakyLedger {
    async fn get(&self, id: Uuid) -> LedgerResult<Option<Booking>> {
        self.inner.get(id).await
    }

    async fn active_booking_for_renter(&self, renter_id: &str) -> LedgerResult<Option<Booking>> {
        self.inner.active_booking_for_renter(renter_id).await
    }

    async fn active_bookings_for_listing(&self, listing_id: Uuid) -> LedgerResult<Vec<Booking>> {
        self.inner.active_bookings_for_listing(listing_id).await
    }

    async fn history_for_listing(&self, listing_id: Uuid) -> LedgerResult<Vec<Booking>> {
        self.inner.history_for_listing(listing_id).await
    }

    async fn history_for_renter(&self, renter_id: &str) -> LedgerResult<Vec<Booking>> {
        self.inner.history_for_renter(renter_id).await
    }

    async fn insert(&self, booking: Booking) -> LedgerResult<()> {
        self.inner.insert(booking).await
    }

    async fn cancel(&self, id: Uuid, cause: CancellationCause) -> LedgerResult<CancelOutcome> {
        self.inner.cancel(id, cause).await
    }

    async fn commit(&self, change: BookingChange) -> LedgerResult<CommitOutcome> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if !self.take_failure() {
            return self.inner.commit(change).await;
        }
        match self.fault {
            CommitFault::Refuse => Err(LedgerError::Unavailable("connection reset".to_string())),
            CommitFault::LoseReply => {
                self.inner.commit(change).await?;
                Err(LedgerError::Unavailable("reply lost".to_string()))
            }
        }
    }
}
