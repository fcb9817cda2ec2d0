use anyhow::Context;
use marquee_api::{app, middleware::auth::JwtVerifier, AppState};
use marquee_booking::BookingCoordinator;
use marquee_core::events::{BookingEventPublisher, NoopEventPublisher};
use marquee_store::{app_config::Config, DbClient, EventProducer, PgBookingStorage, PgCatalog, RedisSeatLocks};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=debug,marquee_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis
    let locks = RedisSeatLocks::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;

    // Kafka
    let events: Arc<dyn BookingEventPublisher> = match &config.kafka {
        Some(kafka) => Arc::new(EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?),
        None => {
            tracing::warn!("No Kafka brokers configured; booking events will not be published");
            Arc::new(NoopEventPublisher)
        }
    };

    let coordinator = BookingCoordinator::new(
        Arc::new(PgBookingStorage::new(db.pool.clone())),
        Arc::new(PgCatalog::new(db.pool.clone())),
        Arc::new(locks),
        events,
    )
    .with_lock_ttl(config.booking.seat_lock_ttl());

    let app_state = AppState::new(coordinator, Arc::new(JwtVerifier::new(&config.auth.jwt_secret)));
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
