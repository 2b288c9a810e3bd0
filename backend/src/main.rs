//! Backend entry-point: loads configuration, prepares storage, and serves
//! the REST API.

mod server;

use actix_web::web;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use backend::AppConfig;
use backend::domain::IdempotencyConfig;
use backend::inbound::http::health::HealthState;
use backend::inbound::http::session_config::{BuildMode, key_fingerprint, session_settings};
use backend::outbound::persistence::{DbPool, PoolConfig, run_pending_migrations};
use server::{ServerConfig, create_server};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let app_config = AppConfig::load_from_iter(std::env::args_os())
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    let session = session_settings(&app_config.session_toggles(), BuildMode::from_debug_assertions())
        .map_err(std::io::Error::other)?;
    info!(
        fingerprint = %key_fingerprint(&session.key),
        cookie_secure = session.cookie_secure,
        "session key loaded"
    );

    let idempotency = IdempotencyConfig::from_env();
    info!(
        staleness_secs = idempotency.staleness_window().as_secs(),
        retry_after_secs = idempotency.retry_after().as_secs(),
        "idempotency configured"
    );

    let mut config =
        ServerConfig::new(session, app_config.bind_addr()).with_idempotency(idempotency);
    if let Some(pool_config) = app_config.pool_config() {
        config = config.with_db_pool(connect(pool_config).await?);
    }

    #[cfg(feature = "metrics")]
    let config = config.with_metrics(server::make_metrics());

    let health_state = web::Data::new(HealthState::new());
    let bind_addr = app_config.bind_addr();
    let server = create_server(health_state, config)?;
    info!(%bind_addr, "listening");
    server.await
}

/// Migrate the schema, then open the pool.
async fn connect(pool_config: PoolConfig) -> std::io::Result<DbPool> {
    let url = pool_config.database_url().to_owned();
    let applied = tokio::task::spawn_blocking(move || run_pending_migrations(&url))
        .await
        .map_err(std::io::Error::other)?
        .map_err(std::io::Error::other)?;
    info!(applied, "database schema up to date");

    DbPool::new(pool_config)
        .await
        .map_err(std::io::Error::other)
}
