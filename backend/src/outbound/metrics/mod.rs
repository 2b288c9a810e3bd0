//! Prometheus exporters for domain metrics ports.
//!
//! Only compiled with the `metrics` feature.

mod prometheus_idempotency;

pub use prometheus_idempotency::PrometheusIdempotencyMetrics;
