//! Domain primitives, services, and ports.
//!
//! Purpose: keep the idempotency protocol independent of actix-web and
//! Diesel. Inbound adapters translate HTTP into [`ResolveRequest`]s and
//! outbound adapters implement [`ports::IdempotencyStore`].
//!
//! Public surface:
//! - [`Error`] / [`ErrorCode`]: transport-agnostic failure payload.
//! - [`IdempotencyKey`], [`RequestFingerprint`], [`MutationRoute`],
//!   [`IdempotencyRecord`]: the deduplication model.
//! - [`IdempotencyService`]: resolver and persister over a record store.

pub mod error;
pub mod idempotency;
pub mod idempotency_service;
pub mod ports;
pub mod trace_id;
pub mod user;

pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::idempotency::{
    CredentialDigestError, CredentialSecret, FingerprintError, IDEMPOTENCY_KEY_MAX_LEN, IDEMPOTENCY_RETRY_AFTER_SECS_ENV,
    IDEMPOTENCY_STALENESS_SECS_ENV, IdempotencyClaim, IdempotencyConfig, IdempotencyKey,
    IdempotencyKeyValidationError, IdempotencyRecord, MutationRoute, NewPendingRecord,
    ParseMutationRouteError, ParseRecordStatusError, REQUESTER_ID_MAX_LEN, RecordId,
    RecordStatus, RequestFingerprint, RequesterId, RequesterIdValidationError, ResolveOutcome,
    ResolveRequest, RouteTemplate, RouteTemplateValidationError, StoredResponse,
    fingerprint_fields, fingerprint_with_credentials, stale_cutoff,
};
pub use self::idempotency_service::{
    CLAIM_SUPERSEDED_CODE, IN_FLIGHT_CODE, IdempotencyService, KEY_REUSED_CODE, in_flight_error,
    key_reused_error,
};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};
pub use self::user::{UserId, UserValidationError};
