//! Stored idempotency records, claims, and resolver outcomes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{IdempotencyKey, RequestFingerprint, RouteTemplate};
use crate::domain::UserId;

/// Longest requester identifier the record table accepts.
pub const REQUESTER_ID_MAX_LEN: usize = 128;
const ANONYMOUS_REQUESTER: &str = "anon";

/// Surrogate identifier of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a fresh identifier for a new record.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an identifier loaded from storage.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validation errors for [`RequesterId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequesterIdValidationError {
    #[error("requester id must not be empty")]
    Empty,
    #[error("requester id must be at most {max} characters")]
    TooLong { max: usize },
    #[error("requester id must not contain whitespace")]
    Whitespace,
}

/// Principal a record belongs to.
///
/// Authenticated callers are scoped by account (`user:<uuid>`). Anonymous
/// callers creating an account share the single `anon` scope, where the key
/// and fingerprint alone identify the request. A record for one requester
/// never satisfies another's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequesterId(String);

impl RequesterId {
    /// Validate a raw requester identifier, e.g. one loaded from storage.
    pub fn new(raw: impl Into<String>) -> Result<Self, RequesterIdValidationError> {
        Self::from_owned(raw.into())
    }

    /// Scope records to an authenticated account.
    pub fn user(user_id: &UserId) -> Self {
        Self(format!("user:{}", user_id.as_uuid()))
    }

    /// Shared scope for unauthenticated callers.
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_REQUESTER.to_owned())
    }

    fn from_owned(raw: String) -> Result<Self, RequesterIdValidationError> {
        if raw.is_empty() {
            return Err(RequesterIdValidationError::Empty);
        }
        if raw.chars().count() > REQUESTER_ID_MAX_LEN {
            return Err(RequesterIdValidationError::TooLong {
                max: REQUESTER_ID_MAX_LEN,
            });
        }
        if raw.contains(char::is_whitespace) {
            return Err(RequesterIdValidationError::Whitespace);
        }
        Ok(Self(raw))
    }
}

impl AsRef<str> for RequesterId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl From<RequesterId> for String {
    fn from(value: RequesterId) -> Self {
        value.0
    }
}

impl TryFrom<String> for RequesterId {
    type Error = RequesterIdValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_owned(value)
    }
}

/// Resolution state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// A claim holder is (or was) executing the operation.
    Pending,
    /// The operation succeeded and its response is stored.
    Completed,
    /// The operation failed; the next resolve may reclaim the key.
    Failed,
}

impl RecordStatus {
    /// All status variants.
    pub const ALL: [RecordStatus; 3] = [
        RecordStatus::Pending,
        RecordStatus::Completed,
        RecordStatus::Failed,
    ];

    /// Returns the database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown record status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid record status '{input}': expected pending, completed, or failed")]
pub struct ParseRecordStatusError {
    /// The invalid input string.
    pub input: String,
}

impl FromStr for RecordStatus {
    type Err = ParseRecordStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| ParseRecordStatusError { input: s.to_owned() })
    }
}

/// Response captured for byte-exact replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    /// HTTP status code of the original response.
    pub status: u16,
    /// Raw body bytes, `None` for empty responses such as `204`.
    pub body: Option<Vec<u8>>,
}

impl StoredResponse {
    /// Build a stored response.
    pub fn new(status: u16, body: Option<Vec<u8>>) -> Self {
        Self { status, body }
    }

    /// A response without a body.
    pub fn empty(status: u16) -> Self {
        Self { status, body: None }
    }
}

/// Persisted deduplication unit for one (key, route, requester) tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub id: RecordId,
    pub key: IdempotencyKey,
    pub route: RouteTemplate,
    pub requester: RequesterId,
    pub fingerprint: RequestFingerprint,
    pub status: RecordStatus,
    /// Claim generation; starts at 1 and grows on every reclaim.
    pub attempt: u32,
    /// Present only once `status` is [`RecordStatus::Completed`].
    pub response: Option<StoredResponse>,
    /// Start of the current attempt; staleness is measured from here.
    pub claimed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    /// Whether a pending claim has outlived the staleness window.
    ///
    /// # Example
    ///
    /// ```
    /// # use backend::domain::{IdempotencyKey, IdempotencyRecord, MutationRoute, RecordId,
    /// #     RecordStatus, RequestFingerprint, RequesterId, UserId};
    /// # use chrono::{Duration as ChronoDuration, Utc};
    /// # use std::time::Duration;
    /// let now = Utc::now();
    /// let record = IdempotencyRecord {
    ///     id: RecordId::random(),
    ///     key: IdempotencyKey::random(),
    ///     route: MutationRoute::UpdateProfile.template(),
    ///     requester: RequesterId::user(&UserId::random()),
    ///     fingerprint: RequestFingerprint::from_bytes([0; 32]),
    ///     status: RecordStatus::Pending,
    ///     attempt: 1,
    ///     response: None,
    ///     claimed_at: now - ChronoDuration::seconds(31),
    ///     created_at: now - ChronoDuration::seconds(31),
    ///     completed_at: None,
    /// };
    /// assert!(record.is_stale(now, Duration::from_secs(30)));
    /// assert!(!record.is_stale(now, Duration::from_secs(60)));
    /// ```
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.status == RecordStatus::Pending && self.claimed_at < stale_cutoff(now, window)
    }

    /// Age of the record since first sighting, saturating at zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Instant before which a pending claim counts as abandoned.
pub fn stale_cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window =
        chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(365));
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Fields written when a tuple is first sighted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPendingRecord {
    pub id: RecordId,
    pub key: IdempotencyKey,
    pub route: RouteTemplate,
    pub requester: RequesterId,
    pub fingerprint: RequestFingerprint,
    pub claimed_at: DateTime<Utc>,
}

/// Right to execute an operation, handed out by the resolver.
///
/// The persister presents the claim back so that a holder superseded by a
/// reclaim cannot overwrite the newer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyClaim {
    pub record_id: RecordId,
    pub attempt: u32,
    pub key: IdempotencyKey,
    pub route: RouteTemplate,
    pub requester: RequesterId,
}

/// Everything the resolver needs to classify one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    /// `None` disables deduplication for this request.
    pub key: Option<IdempotencyKey>,
    pub route: RouteTemplate,
    pub requester: RequesterId,
    pub fingerprint: RequestFingerprint,
}

/// Classification of an incoming mutating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Execute the operation. `None` when the request carried no key.
    New(Option<IdempotencyClaim>),
    /// Return the stored response without executing anything.
    Replay(StoredResponse),
    /// Another attempt holds a live claim; the client should back off.
    InFlight { retry_after: Duration },
    /// The key was already used for a different payload.
    Conflict,
}
