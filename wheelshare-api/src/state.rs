use std::sync::Arc;
use wheelshare_booking::{BookingCoordinator, BookingLedger, InMemoryLedger, RandomCodeGenerator};
use wheelshare_catalog::{InMemoryListingStore, ListingRepository};
use wheelshare_core::Geocoder;
use wheelshare_store::app_config::{BookingRules, RateLimitConfig};
use wheelshare_store::{DbClient, PgBookingLedger, PgListingRepository, RedisClient};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<BookingCoordinator>,
    pub listings: Arc<dyn ListingRepository>,
    pub geocoder: Arc<dyn Geocoder>,
    pub auth: AuthConfig,
    pub metrics: Arc<Metrics>,
    /// Set when listings and bookings live in PostgreSQL
    pub db: Option<Arc<DbClient>>,
    /// Set when rate limiting is on
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        ledger: Arc<dyn BookingLedger>,
        geocoder: Arc<dyn Geocoder>,
        rules: &BookingRules,
        auth: AuthConfig,
    ) -> Result<Self, prometheus::Error> {
        let coordinator = BookingCoordinator::new(
            listings.clone(),
            ledger,
            Arc::new(RandomCodeGenerator::new(rules.code_length)),
            rules.policy(),
        );

        Ok(Self {
            coordinator: Arc::new(coordinator),
            listings,
            geocoder,
            auth,
            metrics: Arc::new(Metrics::new()?),
            db: None,
            redis: None,
            rate_limit: RateLimitConfig::default(),
        })
    }

    /// Everything in process memory
    pub fn in_memory(geocoder: Arc<dyn Geocoder>, rules: &BookingRules, auth: AuthConfig) -> Result<Self, prometheus::Error> {
        Self::new(
            Arc::new(InMemoryListingStore::new()),
            Arc::new(InMemoryLedger::new()),
            geocoder,
            rules,
            auth,
        )
    }

    /// Listings and bookings in PostgreSQL
    pub fn postgres(
        db: DbClient,
        geocoder: Arc<dyn Geocoder>,
        rules: &BookingRules,
        auth: AuthConfig,
    ) -> Result<Self, prometheus::Error> {
        let mut state = Self::new(
            Arc::new(PgListingRepository::new(db.pool.clone())),
            Arc::new(PgBookingLedger::new(db.pool.clone())),
            geocoder,
            rules,
            auth,
        )?;
        state.db = Some(Arc::new(db));
        Ok(state)
    }

    pub fn with_rate_limit(mut self, redis: RedisClient, limits: RateLimitConfig) -> Self {
        self.redis = Some(Arc::new(redis));
        self.rate_limit = limits;
        self
    }
}
