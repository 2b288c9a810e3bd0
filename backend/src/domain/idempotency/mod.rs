//! Idempotent mutation model.
//!
//! This module holds the types the resolver and persister exchange:
//!
//! - [`IdempotencyKey`]: opaque token from the `Idempotency-Key` header.
//! - [`MutationRoute`] / [`RouteTemplate`]: static route table and the
//!   normalised route identity stored with each record.
//! - [`RequestFingerprint`]: SHA-256 over the canonical JSON of a route's
//!   declared fields, used to tell retries from key reuse.
//! - [`CredentialSecret`]: keys the digests that stand in for credential
//!   fields inside a fingerprint.
//! - [`IdempotencyRecord`]: one row per (key, route, requester) tuple.
//! - [`ResolveOutcome`]: what a handler should do with a request.
//! - [`IdempotencyConfig`]: staleness window and retry hint.

mod config;
mod credential;
mod fingerprint;
mod key;
mod record;
mod route;

pub use config::{
    IDEMPOTENCY_RETRY_AFTER_SECS_ENV, IDEMPOTENCY_STALENESS_SECS_ENV, IdempotencyConfig,
};
pub use credential::{CredentialDigestError, CredentialSecret};
pub use fingerprint::{
    FingerprintError, RequestFingerprint, fingerprint_fields, fingerprint_with_credentials,
};
pub use key::{IDEMPOTENCY_KEY_MAX_LEN, IdempotencyKey, IdempotencyKeyValidationError};
pub use record::{
    IdempotencyClaim, IdempotencyRecord, NewPendingRecord, ParseRecordStatusError,
    REQUESTER_ID_MAX_LEN, RecordId, RecordStatus, RequesterId, RequesterIdValidationError,
    ResolveOutcome, ResolveRequest, StoredResponse, stale_cutoff,
};
pub use route::{
    MutationRoute, ParseMutationRouteError, RouteTemplate, RouteTemplateValidationError,
};
