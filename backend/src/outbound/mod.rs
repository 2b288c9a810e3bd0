//! Outbound adapters implementing domain ports.
//!
//! - **persistence**: PostgreSQL idempotency record store (Diesel)
//! - **metrics**: Prometheus exporters (feature-gated)

#[cfg(feature = "metrics")]
pub mod metrics;
pub mod persistence;
