//! Keyed digests for credential fields.
//!
//! Fingerprints are persisted with every record, so a password must never
//! reach one in the clear or as a bare hash. Credential fields are instead
//! replaced by HMAC-SHA256 digests under a server-held secret before the
//! fingerprint is computed.

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const DERIVATION_LABEL: &[u8] = b"fitlog/credential-fingerprint/v1";

/// Errors raised while digesting a credential.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("credential secret rejected: {message}")]
pub struct CredentialDigestError {
    message: String,
}

/// Server-held secret for credential digests.
///
/// # Example
///
/// ```
/// # use backend::domain::CredentialSecret;
/// let secret = CredentialSecret::derive_from(b"server key material");
/// let a = secret.digest("hunter2").expect("digest");
/// assert_eq!(a, secret.digest("hunter2").expect("digest"));
/// assert_ne!(a, secret.digest("hunter3").expect("digest"));
/// ```
#[derive(Clone)]
pub struct CredentialSecret(Arc<Zeroizing<Vec<u8>>>);

impl CredentialSecret {
    /// Derive a dedicated secret from other key material, such as the
    /// session signing key, so the two never share raw bytes.
    pub fn derive_from(material: &[u8]) -> Self {
        let derived = Sha256::new()
            .chain_update(DERIVATION_LABEL)
            .chain_update(material)
            .finalize();
        Self(Arc::new(Zeroizing::new(derived.to_vec())))
    }

    /// Lowercase hex HMAC-SHA256 of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialDigestError`] if the MAC rejects the key.
    pub fn digest(&self, value: &str) -> Result<String, CredentialDigestError> {
        let mut mac = HmacSha256::new_from_slice(self.0.as_slice()).map_err(|err| {
            CredentialDigestError {
                message: err.to_string(),
            }
        })?;
        mac.update(value.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn digests_depend_on_the_secret() {
        let first = CredentialSecret::derive_from(b"one");
        let second = CredentialSecret::derive_from(b"two");
        assert_ne!(
            first.digest("pw").expect("digest"),
            second.digest("pw").expect("digest")
        );
    }

    #[rstest]
    fn digest_is_not_a_bare_hash_of_the_value() {
        let secret = CredentialSecret::derive_from(b"material");
        let bare = hex::encode(Sha256::digest(b"pw"));
        let digest = secret.digest("pw").expect("digest");
        assert_ne!(digest, bare);
        assert_eq!(digest.len(), 64);
    }

    #[rstest]
    fn debug_output_hides_the_secret() {
        let secret = CredentialSecret::derive_from(b"material");
        assert_eq!(format!("{secret:?}"), "CredentialSecret(..)");
    }
}
