use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use wheelshare_store::redis_repo::rate_limit_key;

use crate::state::AppState;

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let Some(redis) = &state.redis else {
        return next.run(req).await;
    };

    let key = rate_limit_key(&addr.ip().to_string());
    let limits = &state.rate_limit;

    match redis.check_rate_limit(&key, limits.requests, limits.window_seconds).await {
        Ok(true) => next.run(req).await,
        Ok(false) => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response(),
        Err(e) => {
            // Fail open
            tracing::warn!("Rate limiter unavailable: {}", e);
            next.run(req).await
        }
    }
}
