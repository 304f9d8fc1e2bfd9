#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns whether `key` is still within `limit`
    /// for the current window.
    ///
    /// The window's expiry is set once, when the counter has none, so hits
    /// inside a window never push its end back.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> redis::RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count, ttl): (i64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .ttl(key)
            .query_async(&mut conn)
            .await?;

        if window_needs_expiry(ttl) {
            redis::pipe()
                .expire(key, window_seconds)
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;
        }

        Ok(count <= limit)
    }
}

/// Redis reports -1 for a key without an expiry. That is a freshly opened
/// window, or one whose EXPIRE never landed.
pub fn window_needs_expiry(ttl: i64) -> bool {
    ttl == -1
}

/// Redis key for a client's request counter
pub fn rate_limit_key(client: &str) -> String {
    format!("ratelimit:{}", client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key() {
        assert_eq!(rate_limit_key("10.0.0.7"), "ratelimit:10.0.0.7");
    }

    #[test]
    fn test_expiry_set_only_when_window_opens() {
        // INCR on a missing key leaves it without a TTL.
        assert!(window_needs_expiry(-1));

        // Hits later in the window, including rejected ones, keep the original end.
        assert!(!window_needs_expiry(60));
        assert!(!window_needs_expiry(58));
        assert!(!window_needs_expiry(1));
        assert!(!window_needs_expiry(0));

        // -2 means the key is gone; the INCR in the same pipeline recreates it first.
        assert!(!window_needs_expiry(-2));
    }

    #[tokio::test]
    async fn test_client_rejects_malformed_url() {
        assert!(RedisClient::new("not a url").await.is_err());
    }
}
