//! Idempotent execution of mutating HTTP handlers.
//!
//! Every mutating endpoint funnels through [`run_idempotent`]:
//!
//! ```text
//! resolve ─┬─ New     → operation → persist (or abandon on failure) → response
//!          ├─ Replay  → stored status/body + Idempotent-Replayed: true
//!          ├─ InFlight→ 409 idempotent_request_in_flight + Retry-After
//!          └─ Conflict→ 409 idempotency_key_reused
//! ```

use std::future::Future;

use actix_web::http::header::{CONTENT_TYPE, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::domain::ports::IdempotencyGate;
use crate::domain::{
    CredentialSecret, Error, FingerprintError, IdempotencyKey, IdempotencyKeyValidationError,
    MutationRoute, RequestFingerprint, RequesterId, ResolveOutcome, ResolveRequest,
    StoredResponse, fingerprint_fields, fingerprint_with_credentials, in_flight_error,
    key_reused_error,
};
use crate::inbound::http::ApiResult;

/// Request header carrying the client's idempotency key; echoed on
/// responses to keyed requests.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
/// Response header marking a replayed response.
pub const IDEMPOTENT_REPLAYED_HEADER: &str = "Idempotent-Replayed";

/// Extract and validate the idempotency key from request headers.
///
/// # Errors
///
/// Returns `400 invalid_request` when the header is present but malformed.
pub fn extract_idempotency_key(headers: &HeaderMap) -> Result<Option<IdempotencyKey>, Error> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| map_idempotency_key_error(IdempotencyKeyValidationError::InvalidCharacters))?;
    IdempotencyKey::new(raw)
        .map(Some)
        .map_err(map_idempotency_key_error)
}

fn map_idempotency_key_error(err: IdempotencyKeyValidationError) -> Error {
    Error::invalid_request(format!("invalid Idempotency-Key header: {err}")).with_details(json!({
        "field": IDEMPOTENCY_KEY_HEADER,
        "code": "invalid_idempotency_key",
    }))
}

/// A mutating request described in idempotency terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotentRequest {
    route: MutationRoute,
    key: Option<IdempotencyKey>,
    requester: RequesterId,
    fingerprint: RequestFingerprint,
}

impl IdempotentRequest {
    /// Build from headers, the caller's identity, and the request fields.
    ///
    /// `fields` may hold more than the route declares; only the declared
    /// fingerprint fields are hashed.
    pub fn new(
        route: MutationRoute,
        headers: &HeaderMap,
        requester: RequesterId,
        fields: &Value,
    ) -> Result<Self, Error> {
        let key = extract_idempotency_key(headers)?;
        let fingerprint = fingerprint_fields(route, fields)
            .map_err(|err| fingerprint_error(route, &err))?;
        Ok(Self {
            route,
            key,
            requester,
            fingerprint,
        })
    }

    /// As [`Self::new`], with the route's credential fields folded into the
    /// fingerprint as digests keyed by `secret`.
    pub fn with_credentials(
        route: MutationRoute,
        headers: &HeaderMap,
        requester: RequesterId,
        fields: &Value,
        secret: &CredentialSecret,
    ) -> Result<Self, Error> {
        let key = extract_idempotency_key(headers)?;
        let fingerprint = fingerprint_with_credentials(route, fields, secret)
            .map_err(|err| fingerprint_error(route, &err))?;
        Ok(Self {
            route,
            key,
            requester,
            fingerprint,
        })
    }

    pub fn key(&self) -> Option<&IdempotencyKey> {
        self.key.as_ref()
    }

    pub fn route(&self) -> MutationRoute {
        self.route
    }
}

fn fingerprint_error(route: MutationRoute, err: &FingerprintError) -> Error {
    Error::internal(format!("failed to fingerprint {route}: {err}"))
}

/// Successful result of a wrapped domain operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    status: StatusCode,
    body: Option<Vec<u8>>,
}

impl Executed {
    /// Response with a JSON body.
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(body)
            .map_err(|err| Error::internal(format!("failed to serialise response: {err}")))?;
        Ok(Self {
            status,
            body: Some(bytes),
        })
    }

    pub fn ok<T: Serialize>(body: &T) -> Result<Self, Error> {
        Self::json(StatusCode::OK, body)
    }

    pub fn created<T: Serialize>(body: &T) -> Result<Self, Error> {
        Self::json(StatusCode::CREATED, body)
    }

    pub fn accepted<T: Serialize>(body: &T) -> Result<Self, Error> {
        Self::json(StatusCode::ACCEPTED, body)
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }
}

/// Run `operation` under the idempotency protocol.
///
/// The operation executes only when the gate resolves the request as new.
/// A failed operation releases its claim and its error is returned
/// unchanged. A successful operation's response is returned even if it
/// cannot be stored; the gate logs and counts that failure.
pub async fn run_idempotent<F, Fut>(
    gate: &dyn IdempotencyGate,
    request: IdempotentRequest,
    operation: F,
) -> ApiResult<HttpResponse>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Executed, Error>>,
{
    let IdempotentRequest {
        route,
        key,
        requester,
        fingerprint,
    } = request;
    let outcome = gate
        .resolve(ResolveRequest {
            key: key.clone(),
            route: route.template(),
            requester,
            fingerprint,
        })
        .await?;

    match outcome {
        ResolveOutcome::New(claim) => {
            let executed = match operation().await {
                Ok(executed) => executed,
                Err(err) => {
                    if let Err(release_err) = gate.abandon(claim.as_ref()).await {
                        warn!(route = %route, error = %release_err, "could not release idempotency claim");
                    }
                    return Err(err);
                }
            };
            let stored = StoredResponse::new(executed.status.as_u16(), executed.body);
            if let Err(err) = gate.persist(claim.as_ref(), &stored).await {
                debug!(route = %route, error = %err, "responding without a stored replay");
            }
            respond(&stored, key.as_ref(), false)
        }
        ResolveOutcome::Replay(stored) => respond(&stored, key.as_ref(), true),
        ResolveOutcome::InFlight { retry_after } => Err(in_flight_error(retry_after)),
        ResolveOutcome::Conflict => Err(key_reused_error()),
    }
}

fn respond(
    stored: &StoredResponse,
    key: Option<&IdempotencyKey>,
    replayed: bool,
) -> ApiResult<HttpResponse> {
    let status = StatusCode::from_u16(stored.status).map_err(|_| {
        Error::internal(format!("stored response has invalid status {}", stored.status))
    })?;
    let mut builder = HttpResponse::build(status);
    if let Some(key) = key {
        builder.insert_header((IDEMPOTENCY_KEY_HEADER, key.as_ref()));
    }
    if replayed {
        builder.insert_header((IDEMPOTENT_REPLAYED_HEADER, "true"));
    }
    Ok(match &stored.body {
        Some(body) => builder
            .insert_header((CONTENT_TYPE, "application/json"))
            .body(body.clone()),
        None => builder.finish(),
    })
}

#[cfg(test)]
#[path = "idempotency_tests.rs"]
mod tests;
