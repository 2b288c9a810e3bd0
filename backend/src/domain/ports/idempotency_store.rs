//! Port abstraction for idempotency record persistence.
//!
//! The [`IdempotencyStore`] trait is the only place where concurrent
//! requests for the same (key, route, requester) tuple meet. Every method
//! that decides ownership is a single conditional write; adapters must not
//! implement them as read-then-write sequences.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    IdempotencyClaim, IdempotencyKey, IdempotencyRecord, NewPendingRecord, RecordId,
    RequestFingerprint, RequesterId, RouteTemplate, StoredResponse,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by idempotency store adapters.
    pub enum IdempotencyStoreError {
        /// Store connection could not be established.
        Connection { message: String } => "idempotency store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "idempotency store query failed: {message}",
        /// A stored row could not be mapped back into a record.
        Corrupt { message: String } => "idempotency record is corrupt: {message}",
    }
}

/// Compare-and-swap parameters for taking over a failed or stale record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimRequest {
    pub record_id: RecordId,
    /// Attempt observed by the caller; the swap fails if it has moved on.
    pub observed_attempt: u32,
    /// Fingerprint of the request taking over the key.
    pub fingerprint: RequestFingerprint,
    /// New `claimed_at` for the fresh attempt.
    pub claimed_at: DateTime<Utc>,
    /// Pending records claimed before this instant count as abandoned.
    pub stale_before: DateTime<Utc>,
}

/// Port for idempotency record storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Insert a `pending` record unless the tuple already exists.
    ///
    /// Returns the inserted record, or `None` when another record already
    /// owns the tuple (`INSERT ... ON CONFLICT DO NOTHING RETURNING`).
    async fn insert_pending(
        &self,
        record: &NewPendingRecord,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError>;

    /// Load the record for a tuple, if any.
    async fn find(
        &self,
        key: &IdempotencyKey,
        route: &RouteTemplate,
        requester: &RequesterId,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError>;

    /// Atomically move a failed or stale pending record to a fresh attempt.
    ///
    /// Succeeds only when the record still has `observed_attempt` and is
    /// either `failed` or `pending` with `claimed_at < stale_before`. The
    /// returned record carries `attempt = observed_attempt + 1`. `None`
    /// means another caller won the race.
    async fn reclaim(
        &self,
        request: &ReclaimRequest,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError>;

    /// Store the response for a claim still holding its `pending` attempt.
    ///
    /// Returns `false` when no row matched (record superseded or already
    /// finished).
    async fn complete(
        &self,
        claim: &IdempotencyClaim,
        response: &StoredResponse,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, IdempotencyStoreError>;

    /// Mark a claim's record `failed` if the claim still holds it.
    async fn mark_failed(&self, claim: &IdempotencyClaim) -> Result<bool, IdempotencyStoreError>;
}

/// Store used when no database is configured.
///
/// Every call fails with [`IdempotencyStoreError::Connection`], so keyed
/// requests are refused with `503` instead of running undeduplicated.
/// Unkeyed requests never reach the store and pass through.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredIdempotencyStore;

const UNCONFIGURED: &str = "no idempotency store is configured";

#[async_trait]
impl IdempotencyStore for UnconfiguredIdempotencyStore {
    async fn insert_pending(
        &self,
        _record: &NewPendingRecord,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        Err(IdempotencyStoreError::connection(UNCONFIGURED))
    }

    async fn find(
        &self,
        _key: &IdempotencyKey,
        _route: &RouteTemplate,
        _requester: &RequesterId,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        Err(IdempotencyStoreError::connection(UNCONFIGURED))
    }

    async fn reclaim(
        &self,
        _request: &ReclaimRequest,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        Err(IdempotencyStoreError::connection(UNCONFIGURED))
    }

    async fn complete(
        &self,
        _claim: &IdempotencyClaim,
        _response: &StoredResponse,
        _completed_at: DateTime<Utc>,
    ) -> Result<bool, IdempotencyStoreError> {
        Err(IdempotencyStoreError::connection(UNCONFIGURED))
    }

    async fn mark_failed(&self, _claim: &IdempotencyClaim) -> Result<bool, IdempotencyStoreError> {
        Err(IdempotencyStoreError::connection(UNCONFIGURED))
    }
}
