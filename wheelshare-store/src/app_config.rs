use serde::Deserialize;
use std::env;
use std::time::Duration;
use wheelshare_booking::{Backoff, CoordinatorPolicy};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Absent: listings and bookings live in process memory.
    pub database: Option<DatabaseConfig>,
    /// Absent: no rate limiting.
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking: BookingRules,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BookingRules {
    pub code_length: usize,
    pub code_attempts: u32,
    pub transient_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub stale_read_rounds: u32,
}

impl Default for BookingRules {
    fn default() -> Self {
        let policy = CoordinatorPolicy::default();
        Self {
            code_length: 6,
            code_attempts: policy.code_attempts,
            transient_retries: policy.backoff.retries,
            backoff_base_ms: policy.backoff.base.as_millis() as u64,
            backoff_max_ms: policy.backoff.max.as_millis() as u64,
            stale_read_rounds: policy.stale_read_rounds,
        }
    }
}

impl BookingRules {
    pub fn policy(&self) -> CoordinatorPolicy {
        CoordinatorPolicy {
            code_attempts: self.code_attempts.max(1),
            stale_read_rounds: self.stale_read_rounds.max(1),
            backoff: Backoff {
                retries: self.transient_retries,
                base: Duration::from_millis(self.backoff_base_ms),
                max: Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms)),
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests: i64,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 120,
            window_seconds: 60,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `WHEELSHARE__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("WHEELSHARE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
