//! Builders for the idempotency gate and HTTP handler state.

use std::sync::Arc;

use actix_web::cookie::Key;
use actix_web::web;
use mockable::DefaultClock;
use tracing::{info, warn};

use backend::domain::ports::{IdempotencyGate, UnconfiguredIdempotencyStore};
use backend::domain::{CredentialSecret, IdempotencyService};
use backend::inbound::http::state::{HttpState, HttpStatePorts};
#[cfg(feature = "metrics")]
use backend::outbound::metrics::PrometheusIdempotencyMetrics;
use backend::outbound::persistence::DieselIdempotencyStore;

use super::ServerConfig;

/// Select the record store and metrics recorder for the idempotency service.
///
/// With a pool, records live in PostgreSQL and, when Prometheus is enabled,
/// outcomes are exported. Without a pool keyed requests are refused with
/// `503`; unkeyed requests still execute.
///
/// # Errors
/// Returns [`std::io::Error`] if Prometheus metric registration fails.
#[cfg(feature = "metrics")]
pub(crate) fn build_idempotency_gate(
    config: &ServerConfig,
) -> std::io::Result<Arc<dyn IdempotencyGate>> {
    let clock = Arc::new(DefaultClock);
    let settings = config.idempotency;
    match (&config.db_pool, &config.prometheus) {
        (Some(pool), Some(prom)) => {
            let metrics = PrometheusIdempotencyMetrics::new(&prom.registry).map_err(|e| {
                std::io::Error::other(format!("idempotency metrics registration failed: {e}"))
            })?;
            info!("idempotency records stored in PostgreSQL with Prometheus metrics");
            Ok(Arc::new(IdempotencyService::new(
                Arc::new(DieselIdempotencyStore::new(pool.clone())),
                Arc::new(metrics),
                clock,
                settings,
            )))
        }
        (Some(pool), None) => {
            info!("idempotency records stored in PostgreSQL");
            Ok(Arc::new(IdempotencyService::with_noop_metrics(
                Arc::new(DieselIdempotencyStore::new(pool.clone())),
                clock,
                settings,
            )))
        }
        (None, _) => Ok(unconfigured_gate(clock, config)),
    }
}

/// Select the record store for the idempotency service.
///
/// # Errors
/// Infallible without the `metrics` feature; the signature matches the
/// feature-enabled variant.
#[cfg(not(feature = "metrics"))]
pub(crate) fn build_idempotency_gate(
    config: &ServerConfig,
) -> std::io::Result<Arc<dyn IdempotencyGate>> {
    let clock = Arc::new(DefaultClock);
    match &config.db_pool {
        Some(pool) => {
            info!("idempotency records stored in PostgreSQL");
            Ok(Arc::new(IdempotencyService::with_noop_metrics(
                Arc::new(DieselIdempotencyStore::new(pool.clone())),
                clock,
                config.idempotency,
            )))
        }
        None => Ok(unconfigured_gate(clock, config)),
    }
}

fn unconfigured_gate(clock: Arc<DefaultClock>, config: &ServerConfig) -> Arc<dyn IdempotencyGate> {
    warn!("no database configured; requests carrying an Idempotency-Key will be refused");
    Arc::new(IdempotencyService::with_noop_metrics(
        Arc::new(UnconfiguredIdempotencyStore),
        clock,
        config.idempotency,
    ))
}

/// Assemble handler state around the chosen gate.
///
/// Credential digests are keyed by material derived from the session key.
pub(crate) fn build_http_state(
    gate: Arc<dyn IdempotencyGate>,
    session_key: &Key,
) -> web::Data<HttpState> {
    web::Data::new(HttpState::new(
        gate,
        CredentialSecret::derive_from(session_key.signing()),
        HttpStatePorts::fixtures(),
    ))
}
