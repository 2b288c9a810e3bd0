//! Request fingerprints: canonical JSON digests of the declared fields.
//!
//! Semantically equivalent payloads must hash identically regardless of
//! whitespace or key ordering, so values are canonicalised first:
//!
//! 1. Only the route's declared fingerprint fields are kept.
//! 2. Object keys are sorted recursively; arrays keep their order.
//! 3. The result is serialised to compact JSON and hashed with SHA-256.

use std::fmt;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::{CredentialDigestError, CredentialSecret, MutationRoute};

/// Errors raised while building or decoding a [`RequestFingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintError {
    /// Stored bytes had the wrong length.
    #[error("request fingerprint must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    /// The fingerprint input was not a JSON object.
    #[error("fingerprint input for {route} must be a JSON object")]
    NotAnObject { route: String },
    /// Canonical JSON could not be serialised.
    #[error("failed to serialise canonical fingerprint payload: {message}")]
    Serialization { message: String },
    /// A credential field could not be digested.
    #[error(transparent)]
    Credential(#[from] CredentialDigestError),
}

/// SHA-256 digest of a canonicalised request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestFingerprint([u8; 32]);

impl RequestFingerprint {
    /// Construct a fingerprint from a 32-byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Construct a fingerprint from stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError::InvalidLength`] unless the slice holds
    /// exactly 32 bytes.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, FingerprintError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FingerprintError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Canonicalise an arbitrary JSON value and hash it.
    ///
    /// # Example
    ///
    /// ```
    /// # use backend::domain::RequestFingerprint;
    /// # use serde_json::json;
    /// let a = RequestFingerprint::of_value(&json!({"b": 2, "a": 1})).expect("hash");
    /// let b = RequestFingerprint::of_value(&json!({"a": 1, "b": 2})).expect("hash");
    /// assert_eq!(a, b);
    /// ```
    pub fn of_value(value: &Value) -> Result<Self, FingerprintError> {
        let canonical = canonicalize(value);
        let bytes =
            serde_json::to_vec(&canonical).map_err(|err| FingerprintError::Serialization {
                message: err.to_string(),
            })?;
        Ok(Self(Sha256::digest(&bytes).into()))
    }

    /// Access the raw digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hexadecimal encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprint the fields `route` declares, ignoring everything else.
///
/// `payload` is the request body merged with any path parameters the route
/// declares. Undeclared fields (credentials, client timestamps, tracing
/// metadata) never influence the digest. Declared fields that are absent are
/// omitted, so `{}` and a body without the field hash the same.
///
/// # Errors
///
/// Returns [`FingerprintError::NotAnObject`] when `payload` is not a JSON
/// object.
///
/// # Example
///
/// ```
/// # use backend::domain::{MutationRoute, fingerprint_fields};
/// # use serde_json::json;
/// let route = MutationRoute::UpdateProfile;
/// let a = fingerprint_fields(route, &json!({"displayName": "Ann", "requestedAt": 1}))
///     .expect("object payload");
/// let b = fingerprint_fields(route, &json!({"displayName": "Ann", "requestedAt": 2}))
///     .expect("object payload");
/// assert_eq!(a, b);
/// ```
pub fn fingerprint_fields(
    route: MutationRoute,
    payload: &Value,
) -> Result<RequestFingerprint, FingerprintError> {
    let selected = select_declared(route, payload)?;
    RequestFingerprint::of_value(&Value::Object(selected))
}

/// Fingerprint the declared fields plus keyed digests of the route's
/// credential fields.
///
/// Each credential present in `payload` is replaced by its HMAC under
/// `secret`, so reusing a key with a different password is a different
/// request while the stored fingerprint reveals nothing about either.
///
/// # Errors
///
/// Returns [`FingerprintError::NotAnObject`] when `payload` is not a JSON
/// object, or [`FingerprintError::Credential`] when digesting fails.
///
/// # Example
///
/// ```
/// # use backend::domain::{CredentialSecret, MutationRoute, fingerprint_with_credentials};
/// # use serde_json::json;
/// let secret = CredentialSecret::derive_from(b"server key");
/// let route = MutationRoute::ChangePassword;
/// let first = fingerprint_with_credentials(route, &json!({"newPassword": "one"}), &secret)
///     .expect("object payload");
/// let second = fingerprint_with_credentials(route, &json!({"newPassword": "two"}), &secret)
///     .expect("object payload");
/// assert_ne!(first, second);
/// ```
pub fn fingerprint_with_credentials(
    route: MutationRoute,
    payload: &Value,
    secret: &CredentialSecret,
) -> Result<RequestFingerprint, FingerprintError> {
    let mut selected = select_declared(route, payload)?;
    if let Value::Object(fields) = payload {
        for name in route.credential_fields() {
            let Some(value) = fields.get(*name) else {
                continue;
            };
            let raw = match value {
                Value::String(text) => secret.digest(text)?,
                other => secret.digest(&other.to_string())?,
            };
            selected.insert((*name).to_owned(), Value::String(raw));
        }
    }
    RequestFingerprint::of_value(&Value::Object(selected))
}

fn select_declared(
    route: MutationRoute,
    payload: &Value,
) -> Result<Map<String, Value>, FingerprintError> {
    let Value::Object(fields) = payload else {
        return Err(FingerprintError::NotAnObject {
            route: route.as_str().to_owned(),
        });
    };
    Ok(route
        .fingerprint_fields()
        .iter()
        .filter_map(|name| {
            fields
                .get(*name)
                .map(|value| ((*name).to_owned(), value.clone()))
        })
        .collect())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by_key(|(k, _)| k.as_str());
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
