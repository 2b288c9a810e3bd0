//! Idempotency resolver and persister.
//!
//! [`IdempotencyService`] classifies each keyed mutation before it runs and
//! records its outcome afterwards. Ownership of a (key, route, requester)
//! tuple is decided solely by the store's conditional writes:
//!
//! - first sighting: insert-if-absent of a `pending` record;
//! - failed or stale pending record: compare-and-swap on the attempt counter;
//! - completion: update guarded by record id, attempt, and `pending` status.
//!
//! No in-process locks are taken, so any number of workers may share one
//! store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use super::ports::{
    IdempotencyGate, IdempotencyMetricLabels, IdempotencyMetrics, IdempotencyStore,
    IdempotencyStoreError, NoOpIdempotencyMetrics, ReclaimRequest,
};
use super::{
    Error, IdempotencyClaim, IdempotencyConfig, IdempotencyRecord, NewPendingRecord, RecordId,
    RecordStatus, RequestFingerprint, RequesterId, ResolveOutcome, ResolveRequest,
    StoredResponse, stale_cutoff,
};

/// Details code for a key reused with a different payload.
pub const KEY_REUSED_CODE: &str = "idempotency_key_reused";
/// Details code for a request whose key is held by a live attempt.
pub const IN_FLIGHT_CODE: &str = "idempotent_request_in_flight";
/// Details code for a persist from an attempt that lost its claim.
pub const CLAIM_SUPERSEDED_CODE: &str = "idempotency_claim_superseded";

/// Resolve passes before a contended tuple is reported as in flight.
const MAX_RESOLVE_PASSES: usize = 3;

/// Error returned for [`ResolveOutcome::Conflict`].
pub fn key_reused_error() -> Error {
    Error::conflict("idempotency key already used with a different request")
        .with_details(json!({ "code": KEY_REUSED_CODE }))
}

/// Error returned for [`ResolveOutcome::InFlight`].
///
/// `retryAfterSeconds` in the details drives the `Retry-After` header.
pub fn in_flight_error(retry_after: std::time::Duration) -> Error {
    Error::conflict("a request with this idempotency key is still in progress")
        .with_details(json!({
            "code": IN_FLIGHT_CODE,
            "retryAfterSeconds": retry_after.as_secs().max(1),
        }))
}

/// Bucket a record's age for metric labels.
///
/// Negative ages (clock skew) fall into the youngest bucket.
fn calculate_age_bucket(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - created_at).num_minutes().max(0);

    match minutes {
        0 => "0-1m".to_owned(),
        1..=4 => "1-5m".to_owned(),
        5..=29 => "5-30m".to_owned(),
        30..=119 => "30m-2h".to_owned(),
        120..=1439 => "2h-24h".to_owned(),
        _ => ">24h".to_owned(),
    }
}

/// Anonymised, low-cardinality scope for a requester: first 8 hex chars of
/// the SHA-256 of its identifier.
fn requester_scope(requester: &RequesterId) -> String {
    let hash = Sha256::digest(requester.as_ref().as_bytes());
    hex::encode(hash.iter().take(4).copied().collect::<Vec<u8>>())
}

fn claim_for(record: &IdempotencyRecord) -> IdempotencyClaim {
    IdempotencyClaim {
        record_id: record.id,
        attempt: record.attempt,
        key: record.key.clone(),
        route: record.route.clone(),
        requester: record.requester.clone(),
    }
}

/// Map idempotency store errors to domain errors.
fn map_store_error(error: IdempotencyStoreError) -> Error {
    match error {
        IdempotencyStoreError::Connection { message } => {
            Error::service_unavailable(format!("idempotency store unavailable: {message}"))
        }
        IdempotencyStoreError::Query { message } => {
            Error::internal(format!("idempotency store error: {message}"))
        }
        IdempotencyStoreError::Corrupt { message } => {
            Error::internal(format!("idempotency record is corrupt: {message}"))
        }
    }
}

/// What an existing record means for the incoming request.
enum Classification {
    Replay(StoredResponse),
    Conflict,
    InFlight,
    Reclaimable,
}

fn classify(
    record: &IdempotencyRecord,
    fingerprint: &RequestFingerprint,
    now: DateTime<Utc>,
    config: &IdempotencyConfig,
) -> Result<Classification, Error> {
    let same_request = record.fingerprint == *fingerprint;
    match record.status {
        RecordStatus::Completed if same_request => match &record.response {
            Some(response) => Ok(Classification::Replay(response.clone())),
            None => Err(Error::internal(format!(
                "completed idempotency record {} has no stored response",
                record.id
            ))),
        },
        RecordStatus::Completed => Ok(Classification::Conflict),
        RecordStatus::Failed => Ok(Classification::Reclaimable),
        RecordStatus::Pending if record.is_stale(now, config.staleness_window()) => {
            Ok(Classification::Reclaimable)
        }
        RecordStatus::Pending if same_request => Ok(Classification::InFlight),
        RecordStatus::Pending => Ok(Classification::Conflict),
    }
}

/// Metric event emitted by the service.
enum Outcome<'a> {
    Miss,
    Hit(&'a IdempotencyRecord),
    Conflict(&'a IdempotencyRecord),
    InFlight(Option<&'a IdempotencyRecord>),
    Reclaim(&'a IdempotencyRecord),
    PersistFailure,
}

/// Resolver and persister over an [`IdempotencyStore`].
///
/// The `M` type parameter injects a metrics recorder; use
/// [`NoOpIdempotencyMetrics`] when metrics are not needed.
pub struct IdempotencyService<S, M = NoOpIdempotencyMetrics> {
    store: Arc<S>,
    metrics: Arc<M>,
    clock: Arc<dyn Clock>,
    config: IdempotencyConfig,
}

impl<S> IdempotencyService<S, NoOpIdempotencyMetrics>
where
    S: IdempotencyStore,
{
    /// Create a service that records no metrics.
    pub fn with_noop_metrics(store: Arc<S>, clock: Arc<dyn Clock>, config: IdempotencyConfig) -> Self {
        Self::new(store, Arc::new(NoOpIdempotencyMetrics), clock, config)
    }
}

impl<S, M> IdempotencyService<S, M>
where
    S: IdempotencyStore,
    M: IdempotencyMetrics,
{
    /// Create a new service.
    pub fn new(
        store: Arc<S>,
        metrics: Arc<M>,
        clock: Arc<dyn Clock>,
        config: IdempotencyConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            clock,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// Classify a mutating request.
    ///
    /// Unkeyed requests are always [`ResolveOutcome::New`] with no claim and
    /// leave no trace in the store. Keyed requests either win a claim, replay
    /// a completed response, or are turned away as in flight or conflicting.
    ///
    /// # Errors
    ///
    /// Store connection failures map to [`super::ErrorCode::ServiceUnavailable`];
    /// other store failures map to [`super::ErrorCode::InternalError`].
    pub async fn resolve(&self, request: ResolveRequest) -> Result<ResolveOutcome, Error> {
        let ResolveRequest {
            key,
            route,
            requester,
            fingerprint,
        } = request;
        let Some(key) = key else {
            debug!(route = %route, "no idempotency key; executing without deduplication");
            return Ok(ResolveOutcome::New(None));
        };
        let scope = requester_scope(&requester);

        for pass in 1..=MAX_RESOLVE_PASSES {
            let now = self.clock.utc();
            let candidate = NewPendingRecord {
                id: RecordId::random(),
                key: key.clone(),
                route: route.clone(),
                requester: requester.clone(),
                fingerprint,
                claimed_at: now,
            };
            if let Some(inserted) = self
                .store
                .insert_pending(&candidate)
                .await
                .map_err(map_store_error)?
            {
                info!(
                    key = %key,
                    route = %route,
                    record_id = %inserted.id,
                    attempt = inserted.attempt,
                    outcome = "new",
                    "claimed idempotency key"
                );
                self.record(Outcome::Miss, &route, &scope).await;
                return Ok(ResolveOutcome::New(Some(claim_for(&inserted))));
            }

            let Some(existing) = self
                .store
                .find(&key, &route, &requester)
                .await
                .map_err(map_store_error)?
            else {
                debug!(key = %key, route = %route, pass, "idempotency record vanished; retrying insert");
                continue;
            };

            match classify(&existing, &fingerprint, now, &self.config)? {
                Classification::Replay(response) => {
                    info!(
                        key = %key,
                        route = %route,
                        record_id = %existing.id,
                        attempt = existing.attempt,
                        outcome = "replay",
                        "replaying stored response"
                    );
                    self.record(Outcome::Hit(&existing), &route, &scope).await;
                    return Ok(ResolveOutcome::Replay(response));
                }
                Classification::Conflict => {
                    warn!(
                        key = %key,
                        route = %route,
                        record_id = %existing.id,
                        status = %existing.status,
                        outcome = "conflict",
                        "idempotency key reused with a different request"
                    );
                    self.record(Outcome::Conflict(&existing), &route, &scope)
                        .await;
                    return Ok(ResolveOutcome::Conflict);
                }
                Classification::InFlight => {
                    info!(
                        key = %key,
                        route = %route,
                        record_id = %existing.id,
                        attempt = existing.attempt,
                        outcome = "in_flight",
                        "idempotent request still in progress"
                    );
                    self.record(Outcome::InFlight(Some(&existing)), &route, &scope)
                        .await;
                    return Ok(self.in_flight());
                }
                Classification::Reclaimable => {
                    let reclaim = ReclaimRequest {
                        record_id: existing.id,
                        observed_attempt: existing.attempt,
                        fingerprint,
                        claimed_at: now,
                        stale_before: stale_cutoff(now, self.config.staleness_window()),
                    };
                    if let Some(reclaimed) = self
                        .store
                        .reclaim(&reclaim)
                        .await
                        .map_err(map_store_error)?
                    {
                        info!(
                            key = %key,
                            route = %route,
                            record_id = %reclaimed.id,
                            attempt = reclaimed.attempt,
                            previous_status = %existing.status,
                            outcome = "reclaimed",
                            "reclaimed idempotency key"
                        );
                        self.record(Outcome::Reclaim(&existing), &route, &scope)
                            .await;
                        return Ok(ResolveOutcome::New(Some(claim_for(&reclaimed))));
                    }
                    debug!(
                        key = %key,
                        route = %route,
                        record_id = %existing.id,
                        pass,
                        "lost reclaim race; re-reading record"
                    );
                }
            }
        }

        warn!(
            key = %key,
            route = %route,
            passes = MAX_RESOLVE_PASSES,
            outcome = "in_flight",
            "idempotency tuple remained contended"
        );
        self.record(Outcome::InFlight(None), &route, &scope).await;
        Ok(self.in_flight())
    }

    /// Store the response for a claim.
    ///
    /// A `None` claim (unkeyed request) is a no-op. Persisting the same
    /// response twice for the same attempt succeeds.
    ///
    /// When this fails after the operation already succeeded, the caller
    /// should still return the real response: the failure is logged and
    /// counted here. The record then stays `pending` and the key has no
    /// replay protection once the staleness window elapses, so a later retry
    /// may execute the operation again.
    ///
    /// # Errors
    ///
    /// Returns [`super::ErrorCode::Conflict`] with details code
    /// `idempotency_claim_superseded` when another attempt now owns the
    /// record, or a mapped store error.
    pub async fn persist(
        &self,
        claim: Option<&IdempotencyClaim>,
        response: &StoredResponse,
    ) -> Result<(), Error> {
        let Some(claim) = claim else {
            debug!("no idempotency claim; skipping response persistence");
            return Ok(());
        };
        let scope = requester_scope(&claim.requester);
        let completed_at = self.clock.utc();

        let result = match self.store.complete(claim, response, completed_at).await {
            Ok(true) => Ok(()),
            Ok(false) => self.confirm_completed(claim, response).await,
            Err(err) => Err(map_store_error(err)),
        };

        match result {
            Ok(()) => {
                debug!(
                    key = %claim.key,
                    route = %claim.route,
                    record_id = %claim.record_id,
                    attempt = claim.attempt,
                    status = response.status,
                    "stored idempotent response"
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    key = %claim.key,
                    route = %claim.route,
                    requester_scope = %scope,
                    record_id = %claim.record_id,
                    attempt = claim.attempt,
                    error = %err,
                    "failed to store idempotent response"
                );
                self.record(Outcome::PersistFailure, &claim.route, &scope)
                    .await;
                Err(err)
            }
        }
    }

    /// Accept a repeated persist of an identical response; reject the rest.
    async fn confirm_completed(
        &self,
        claim: &IdempotencyClaim,
        response: &StoredResponse,
    ) -> Result<(), Error> {
        let current = self
            .store
            .find(&claim.key, &claim.route, &claim.requester)
            .await
            .map_err(map_store_error)?;
        let already_stored = current.as_ref().is_some_and(|record| {
            record.id == claim.record_id
                && record.attempt == claim.attempt
                && record.status == RecordStatus::Completed
                && record.response.as_ref() == Some(response)
        });
        if already_stored {
            return Ok(());
        }
        Err(
            Error::conflict("idempotency claim was superseded by another attempt").with_details(
                json!({
                    "code": CLAIM_SUPERSEDED_CODE,
                    "recordId": claim.record_id.to_string(),
                    "attempt": claim.attempt,
                }),
            ),
        )
    }

    /// Mark a claim's record `failed` so the next resolve reclaims it.
    ///
    /// A claim that was already superseded is left alone. If the store
    /// rejects the write, the record stays `pending` and becomes reclaimable
    /// after the staleness window.
    pub async fn abandon(&self, claim: Option<&IdempotencyClaim>) -> Result<(), Error> {
        let Some(claim) = claim else {
            return Ok(());
        };
        match self.store.mark_failed(claim).await {
            Ok(true) => {
                info!(
                    key = %claim.key,
                    route = %claim.route,
                    record_id = %claim.record_id,
                    attempt = claim.attempt,
                    outcome = "failed",
                    "released idempotency claim after failure"
                );
                Ok(())
            }
            Ok(false) => {
                debug!(
                    key = %claim.key,
                    record_id = %claim.record_id,
                    attempt = claim.attempt,
                    "idempotency claim already superseded; nothing to release"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    key = %claim.key,
                    route = %claim.route,
                    record_id = %claim.record_id,
                    attempt = claim.attempt,
                    error = %err,
                    "failed to release idempotency claim; it will expire after the staleness window"
                );
                Err(map_store_error(err))
            }
        }
    }

    fn in_flight(&self) -> ResolveOutcome {
        ResolveOutcome::InFlight {
            retry_after: self.config.retry_after(),
        }
    }

    /// Record a metric. Exporter errors are logged and otherwise ignored.
    async fn record(&self, outcome: Outcome<'_>, route: &impl std::fmt::Display, scope: &str) {
        let now = self.clock.utc();
        let age_bucket = match &outcome {
            Outcome::Hit(record)
            | Outcome::Conflict(record)
            | Outcome::Reclaim(record)
            | Outcome::InFlight(Some(record)) => Some(calculate_age_bucket(record.created_at, now)),
            Outcome::Miss | Outcome::InFlight(None) | Outcome::PersistFailure => None,
        };
        let labels = IdempotencyMetricLabels {
            route: route.to_string(),
            user_scope: scope.to_owned(),
            age_bucket,
        };
        let result = match outcome {
            Outcome::Miss => self.metrics.record_miss(&labels).await,
            Outcome::Hit(_) => self.metrics.record_hit(&labels).await,
            Outcome::Conflict(_) => self.metrics.record_conflict(&labels).await,
            Outcome::InFlight(_) => self.metrics.record_in_flight(&labels).await,
            Outcome::Reclaim(_) => self.metrics.record_reclaim(&labels).await,
            Outcome::PersistFailure => self.metrics.record_persist_failure(&labels).await,
        };
        if let Err(err) = result {
            debug!(error = %err, "idempotency metric write failed");
        }
    }
}

#[async_trait]
impl<S, M> IdempotencyGate for IdempotencyService<S, M>
where
    S: IdempotencyStore,
    M: IdempotencyMetrics,
{
    async fn resolve(&self, request: ResolveRequest) -> Result<ResolveOutcome, Error> {
        IdempotencyService::resolve(self, request).await
    }

    async fn persist(
        &self,
        claim: Option<&IdempotencyClaim>,
        response: &StoredResponse,
    ) -> Result<(), Error> {
        IdempotencyService::persist(self, claim, response).await
    }

    async fn abandon(&self, claim: Option<&IdempotencyClaim>) -> Result<(), Error> {
        IdempotencyService::abandon(self, claim).await
    }
}

#[cfg(test)]
#[path = "idempotency_service_tests.rs"]
mod tests;
