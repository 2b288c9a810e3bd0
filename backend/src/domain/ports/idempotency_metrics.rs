//! Domain port surface for recording idempotency outcomes.
//!
//! Lets the resolver and persister report what they decided without
//! coupling domain logic to a metrics backend.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors exposed when recording idempotency metrics.
    pub enum IdempotencyMetricsError {
        /// Metric exporter rejected the write.
        Export { message: String } => "idempotency metrics exporter failed: {message}",
    }
}

/// Labels attached to every idempotency metric write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyMetricLabels {
    /// Route template, e.g. `PATCH /api/v1/users/me`.
    pub route: String,
    /// Anonymised requester scope (first 8 hex chars of SHA-256).
    pub user_scope: String,
    /// Age bucket of the existing record (e.g. `"0-1m"`).
    /// `None` when no record existed before this request.
    pub age_bucket: Option<String>,
}

/// Metrics recording port for idempotency outcomes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdempotencyMetrics: Send + Sync {
    /// A keyed request claimed a fresh record.
    async fn record_miss(&self, labels: &IdempotencyMetricLabels)
    -> Result<(), IdempotencyMetricsError>;

    /// A completed response was replayed.
    async fn record_hit(&self, labels: &IdempotencyMetricLabels)
    -> Result<(), IdempotencyMetricsError>;

    /// A key was reused with a different fingerprint.
    async fn record_conflict(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError>;

    /// A request hit a live pending claim.
    async fn record_in_flight(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError>;

    /// A failed or stale record was taken over by a new attempt.
    async fn record_reclaim(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError>;

    /// A successful operation's response could not be stored.
    async fn record_persist_failure(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError>;
}

/// No-op implementation for when metrics are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpIdempotencyMetrics;

#[async_trait]
impl IdempotencyMetrics for NoOpIdempotencyMetrics {
    async fn record_miss(
        &self,
        _labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }

    async fn record_hit(
        &self,
        _labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }

    async fn record_conflict(
        &self,
        _labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }

    async fn record_in_flight(
        &self,
        _labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }

    async fn record_reclaim(
        &self,
        _labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }

    async fn record_persist_failure(
        &self,
        _labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }
}
