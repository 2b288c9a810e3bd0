//! Client-supplied idempotency keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest key accepted from the `Idempotency-Key` header.
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;

/// Validation errors for [`IdempotencyKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdempotencyKeyValidationError {
    /// The key string was empty.
    #[error("idempotency key must not be empty")]
    EmptyKey,
    /// The key exceeded [`IDEMPOTENCY_KEY_MAX_LEN`] characters.
    #[error("idempotency key must be at most {max} characters")]
    TooLong { max: usize },
    /// The key carried leading or trailing whitespace.
    #[error("idempotency key must not start or end with whitespace")]
    SurroundingWhitespace,
    /// The key contained non-printable or non-ASCII characters.
    #[error("idempotency key may only contain printable ASCII characters")]
    InvalidCharacters,
}

/// Opaque client token identifying one logical attempt of a mutation.
///
/// Keys are compared byte for byte; no case folding or trimming is applied
/// after validation.
///
/// # Example
///
/// ```
/// # use backend::domain::IdempotencyKey;
/// let key = IdempotencyKey::new("abc").expect("short keys are valid");
/// assert_eq!(key.as_ref(), "abc");
/// assert!(IdempotencyKey::new(" abc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate and construct an [`IdempotencyKey`].
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyKeyValidationError`] when the key is empty, too
    /// long, padded with whitespace, or not printable ASCII.
    pub fn new(key: impl Into<String>) -> Result<Self, IdempotencyKeyValidationError> {
        Self::from_owned(key.into())
    }

    /// Generate a random key. Primarily useful for tests.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    fn from_owned(key: String) -> Result<Self, IdempotencyKeyValidationError> {
        if key.is_empty() {
            return Err(IdempotencyKeyValidationError::EmptyKey);
        }
        if key.chars().count() > IDEMPOTENCY_KEY_MAX_LEN {
            return Err(IdempotencyKeyValidationError::TooLong {
                max: IDEMPOTENCY_KEY_MAX_LEN,
            });
        }
        if key.trim() != key {
            return Err(IdempotencyKeyValidationError::SurroundingWhitespace);
        }
        if !key.bytes().all(|byte| (0x20..=0x7e).contains(&byte)) {
            return Err(IdempotencyKeyValidationError::InvalidCharacters);
        }
        Ok(Self(key))
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl From<IdempotencyKey> for String {
    fn from(value: IdempotencyKey) -> Self {
        value.0
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = IdempotencyKeyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_owned(value)
    }
}
