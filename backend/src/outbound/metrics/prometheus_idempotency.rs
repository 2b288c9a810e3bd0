//! Prometheus adapter for idempotency outcome metrics.
//!
//! Counters are registered with the registry owned by `actix-web-prom`, so
//! they are served from the same `/metrics` endpoint as the HTTP metrics.

use async_trait::async_trait;
use prometheus::{CounterVec, Opts, Registry};

use crate::domain::ports::{IdempotencyMetricLabels, IdempotencyMetrics, IdempotencyMetricsError};

const AGE_BUCKET_NOT_APPLICABLE: &str = "n/a";

/// Prometheus-backed idempotency metrics recorder.
///
/// # Metric Specification
///
/// - **Name**: `fitlog_idempotency_requests_total`
/// - **Type**: Counter
/// - **Labels**:
///   - `outcome`: `miss`, `hit`, `conflict`, `in_flight`, `reclaim`, or
///     `persist_failure`
///   - `route`: route template, e.g. `PATCH /api/v1/users/me`
///   - `user_scope`: 8-character hex hash of the requester id
///   - `age_bucket`: `0-1m`, `1-5m`, `5-30m`, `30m-2h`, `2h-24h`, `>24h`,
///     or `n/a` when no prior record was involved
pub struct PrometheusIdempotencyMetrics {
    requests_total: CounterVec,
}

impl PrometheusIdempotencyMetrics {
    /// Create and register metrics with the given registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests_total = CounterVec::new(
            Opts::new(
                "fitlog_idempotency_requests_total",
                "Keyed mutating requests by idempotency outcome",
            ),
            &["outcome", "route", "user_scope", "age_bucket"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;
        Ok(Self { requests_total })
    }

    fn record(&self, outcome: &str, labels: &IdempotencyMetricLabels) {
        let age_bucket = labels
            .age_bucket
            .as_deref()
            .unwrap_or(AGE_BUCKET_NOT_APPLICABLE);
        self.requests_total
            .with_label_values(&[outcome, &labels.route, &labels.user_scope, age_bucket])
            .inc();
    }
}

#[async_trait]
impl IdempotencyMetrics for PrometheusIdempotencyMetrics {
    async fn record_miss(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        self.record("miss", labels);
        Ok(())
    }

    async fn record_hit(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        self.record("hit", labels);
        Ok(())
    }

    async fn record_conflict(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        self.record("conflict", labels);
        Ok(())
    }

    async fn record_in_flight(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        self.record("in_flight", labels);
        Ok(())
    }

    async fn record_reclaim(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        self.record("reclaim", labels);
        Ok(())
    }

    async fn record_persist_failure(
        &self,
        labels: &IdempotencyMetricLabels,
    ) -> Result<(), IdempotencyMetricsError> {
        self.record("persist_failure", labels);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const ROUTE: &str = "PATCH /api/v1/users/me";

    #[fixture]
    fn registry() -> Registry {
        Registry::new()
    }

    fn labels(scope: &str, age_bucket: Option<&str>) -> IdempotencyMetricLabels {
        IdempotencyMetricLabels {
            route: ROUTE.to_owned(),
            user_scope: scope.to_owned(),
            age_bucket: age_bucket.map(str::to_owned),
        }
    }

    fn count(metrics: &PrometheusIdempotencyMetrics, outcome: &str, scope: &str, age: &str) -> u64 {
        metrics
            .requests_total
            .with_label_values(&[outcome, ROUTE, scope, age])
            .get() as u64
    }

    #[rstest]
    fn registers_counter_family(registry: Registry) {
        let metrics = PrometheusIdempotencyMetrics::new(&registry).expect("registration");
        metrics.record("miss", &labels("a1b2c3d4", None));

        assert!(
            registry
                .gather()
                .iter()
                .any(|family| family.name() == "fitlog_idempotency_requests_total")
        );
    }

    #[rstest]
    fn double_registration_is_rejected(registry: Registry) {
        PrometheusIdempotencyMetrics::new(&registry).expect("first registration");
        assert!(PrometheusIdempotencyMetrics::new(&registry).is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn each_outcome_has_its_own_series(registry: Registry) {
        let metrics = PrometheusIdempotencyMetrics::new(&registry).expect("registration");
        let fresh = labels("deadbeef", None);
        let aged = labels("deadbeef", Some("1-5m"));

        metrics.record_miss(&fresh).await.expect("miss");
        metrics.record_hit(&aged).await.expect("hit");
        metrics.record_hit(&aged).await.expect("hit");
        metrics.record_conflict(&aged).await.expect("conflict");
        metrics.record_in_flight(&aged).await.expect("in flight");
        metrics.record_reclaim(&aged).await.expect("reclaim");
        metrics
            .record_persist_failure(&fresh)
            .await
            .expect("persist failure");

        assert_eq!(count(&metrics, "miss", "deadbeef", "n/a"), 1);
        assert_eq!(count(&metrics, "hit", "deadbeef", "1-5m"), 2);
        assert_eq!(count(&metrics, "conflict", "deadbeef", "1-5m"), 1);
        assert_eq!(count(&metrics, "in_flight", "deadbeef", "1-5m"), 1);
        assert_eq!(count(&metrics, "reclaim", "deadbeef", "1-5m"), 1);
        assert_eq!(count(&metrics, "persist_failure", "deadbeef", "n/a"), 1);
    }
}
