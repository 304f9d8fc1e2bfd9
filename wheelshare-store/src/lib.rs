pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod listing_repo;
pub mod redis_repo;

pub use app_config::Config;
pub use booking_repo::PgBookingLedger;
pub use database::DbClient;
pub use listing_repo::PgListingRepository;
pub use redis_repo::RedisClient;
