use std::future::Future;
use std::time::Duration;
use wheelshare_catalog::CatalogError;

use crate::ledger::LedgerError;

/// Failures worth another attempt after a pause.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

impl Transient for CatalogError {
    fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Unavailable(_))
    }
}

/// Exponential backoff, doubling from `base` and capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Run `op`, retrying transient failures up to `backoff.retries` times.
pub async fn retry_transient<T, E, F, Fut>(backoff: &Backoff, operation: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < backoff.retries => {
                let delay = backoff.delay(attempt);
                tracing::warn!("{} failed ({}), retry {} in {:?}", operation, e, attempt + 1, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(retries: u32) -> Backoff {
        Backoff {
            retries,
            base: Duration::from_millis(1),
            max: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let backoff = Backoff {
            retries: 5,
            base: Duration::from_millis(25),
            max: Duration::from_millis(150),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(25));
        assert_eq!(backoff.delay(1), Duration::from_millis(50));
        assert_eq!(backoff.delay(2), Duration::from_millis(100));
        assert_eq!(backoff.delay(3), Duration::from_millis(150));
        assert_eq!(backoff.delay(40), Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_transient_failures_within_budget_are_absorbed() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, LedgerError> = retry_transient(&quick(3), "read", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(LedgerError::Unavailable("connection reset".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_surfaces_last_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), LedgerError> = retry_transient(&quick(2), "read", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::Unavailable("down".into()))
        })
        .await;

        assert!(matches!(result, Err(LedgerError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), LedgerError> = retry_transient(&quick(5), "commit", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::DuplicateConfirmationCode("AAAAAA".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
