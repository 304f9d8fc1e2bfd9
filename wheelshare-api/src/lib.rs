use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod error;
pub mod listings;
pub mod metrics;
pub mod middleware;
pub mod state;

pub use error::AppError;
pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::USER_AGENT]);

    let v1 = Router::new()
        .merge(listings::routes())
        .merge(bookings::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth_middleware,
        ));

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .nest("/v1", v1);

    // Needs ConnectInfo, which only the real server provides.
    if state.redis.is_some() {
        router = router.layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit_middleware,
        ));
    }

    router.layer(cors).layer(TraceLayer::new_for_http()).with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let storage = match &state.db {
        None => "memory",
        Some(db) => match db.ping().await {
            Ok(()) => "postgres",
            Err(e) => {
                tracing::warn!("Health check failed: {}", e);
                return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "degraded" })));
            }
        },
    };

    (StatusCode::OK, Json(json!({ "status": "ok", "storage": storage })))
}

async fn metrics_text(State(state): State<AppState>) -> Result<String, AppError> {
    state.metrics.render()
}
