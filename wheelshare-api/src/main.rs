use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wheelshare_api::{app, AppState, AuthConfig};
use wheelshare_core::StaticGeocoder;
use wheelshare_store::{Config, DbClient, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wheelshare_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting WheelShare API on port {}", config.server.port);

    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
    };
    let geocoder = Arc::new(StaticGeocoder::new());

    let mut app_state = match &config.database {
        Some(database) => {
            let db = DbClient::new(&database.url, database.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.migrate().await.context("Failed to run migrations")?;
            AppState::postgres(db, geocoder, &config.booking, auth)?
        }
        None => {
            tracing::warn!("No database configured, bookings are kept in memory");
            AppState::in_memory(geocoder, &config.booking, auth)?
        }
    };

    if let Some(redis) = &config.redis {
        let redis_client = RedisClient::new(&redis.url)
            .await
            .context("Failed to connect to Redis")?;
        app_state = app_state.with_rate_limit(redis_client, config.rate_limit.clone());
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
