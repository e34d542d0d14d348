//! Knowledge Centre Server
//!
//! Lending ledger for the school library and device desk.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use knowledge_centre_server::{
    api,
    config::{AppConfig, AuditSinkKind, LoggingConfig},
    repository::{LedgerStore, Repository},
    services::{
        audit::{AuditSink, DatabaseAuditSink, LogAuditSink},
        email::{EmailService, Notifier},
        redis::RedisService,
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting Knowledge Centre Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    // The availability cache is optional; the server runs without it
    let cache = match &config.cache.redis_url {
        Some(url) => match RedisService::new(url, config.cache.ttl()).await {
            Ok(cache) => {
                tracing::info!("Connected to Redis");
                Some(cache)
            }
            Err(e) => {
                tracing::warn!("Redis unavailable, availability cache disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let repository = Repository::new(pool);

    let audit: Arc<dyn AuditSink> = match config.audit.sink {
        AuditSinkKind::Database => Arc::new(DatabaseAuditSink::new(repository.audit.clone())),
        AuditSinkKind::Log => Arc::new(LogAuditSink),
    };
    let notifier: Arc<dyn Notifier> = Arc::new(EmailService::new(
        config.email.clone(),
        config.notifications.timeout(),
    ));
    if !config.email.enabled {
        tracing::warn!("E-mail notifications are disabled; messages will only be logged");
    }
    let store: Arc<dyn LedgerStore> = Arc::new(repository.clone());

    let services = Services::new(&config, repository, store, notifier, audit, cache);

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("knowledge_centre_server={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
