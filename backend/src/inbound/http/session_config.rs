//! Cookie session settings.
//!
//! Turns the session toggles from [`crate::config::AppConfig`] into an
//! actix session key and cookie policy. Debug builds fall back to lenient
//! defaults with a warning; release builds reject anything missing or
//! unsafe.

use std::path::{Path, PathBuf};

use actix_web::cookie::{Key, SameSite};
use sha2::{Digest, Sha256};
use tracing::warn;
use zeroize::Zeroize;

/// Minimum key material accepted in release builds.
pub const SESSION_KEY_MIN_LEN: usize = 64;
const SAMESITE_EXPECTED: &str = "Strict|Lax|None";
const BOOL_EXPECTED: &str = "1|0|true|false|yes|no|y|n";
const FINGERPRINT_BYTES: usize = 8;

/// Build mode for session configuration validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildMode {
    /// Tolerate defaults and warn.
    Debug,
    /// Require explicit, safe settings.
    Release,
}

impl BuildMode {
    /// Mode matching `cfg!(debug_assertions)`.
    #[must_use]
    pub fn from_debug_assertions() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Release
        }
    }

    fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }
}

/// Raw session toggles as loaded from configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionToggles {
    pub key_file: PathBuf,
    pub cookie_secure: Option<String>,
    pub same_site: Option<String>,
}

/// Validated session settings.
pub struct SessionSettings {
    pub key: Key,
    pub cookie_secure: bool,
    pub same_site: SameSite,
}

/// Errors raised while validating session configuration.
#[derive(thiserror::Error, Debug)]
pub enum SessionConfigError {
    #[error("missing required session setting: {name}")]
    Missing { name: &'static str },
    #[error("invalid value for {name}='{value}'; expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("failed to read session key at {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session key at {path} too short: need >= {min_len} bytes, got {length}")]
    KeyTooShort {
        path: PathBuf,
        length: usize,
        min_len: usize,
    },
    #[error("session_same_site=None requires session_cookie_secure=true")]
    InsecureSameSiteNone,
}

/// Validate `toggles` for `mode` and load the session key.
///
/// # Examples
///
/// ```rust
/// use backend::inbound::http::session_config::{BuildMode, SessionToggles, session_settings};
///
/// let toggles = SessionToggles {
///     key_file: "/nonexistent/session_key".into(),
///     ..SessionToggles::default()
/// };
/// let settings = session_settings(&toggles, BuildMode::Debug).expect("debug defaults");
/// assert!(settings.cookie_secure);
/// ```
pub fn session_settings(
    toggles: &SessionToggles,
    mode: BuildMode,
) -> Result<SessionSettings, SessionConfigError> {
    let cookie_secure = cookie_secure(toggles.cookie_secure.as_deref(), mode)?;
    let same_site = same_site(toggles.same_site.as_deref(), mode, cookie_secure)?;
    let key = session_key(&toggles.key_file, mode)?;

    Ok(SessionSettings {
        key,
        cookie_secure,
        same_site,
    })
}

/// Truncated SHA-256 of the signing key, for logs and rotation runbooks.
#[must_use]
pub fn key_fingerprint(key: &Key) -> String {
    let digest = Sha256::digest(key.signing());
    hex::encode(digest.iter().take(FINGERPRINT_BYTES).copied().collect::<Vec<u8>>())
}

fn lenient<T>(mode: BuildMode, fallback: T, error: SessionConfigError) -> Result<T, SessionConfigError> {
    if mode.is_debug() {
        warn!(%error, "using development session default");
        Ok(fallback)
    } else {
        Err(error)
    }
}

fn cookie_secure(raw: Option<&str>, mode: BuildMode) -> Result<bool, SessionConfigError> {
    let Some(raw) = raw else {
        return lenient(
            mode,
            true,
            SessionConfigError::Missing {
                name: "session_cookie_secure",
            },
        );
    };
    match parse_bool(raw) {
        Some(flag) => Ok(flag),
        None => lenient(
            mode,
            true,
            SessionConfigError::Invalid {
                name: "session_cookie_secure",
                value: raw.to_owned(),
                expected: BOOL_EXPECTED,
            },
        ),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn same_site(
    raw: Option<&str>,
    mode: BuildMode,
    cookie_secure: bool,
) -> Result<SameSite, SessionConfigError> {
    let default = if mode.is_debug() {
        SameSite::Lax
    } else {
        SameSite::Strict
    };
    let Some(raw) = raw else {
        return lenient(
            mode,
            default,
            SessionConfigError::Missing {
                name: "session_same_site",
            },
        );
    };
    match raw.to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" if cookie_secure => Ok(SameSite::None),
        "none" => lenient(mode, SameSite::None, SessionConfigError::InsecureSameSiteNone),
        _ => lenient(
            mode,
            default,
            SessionConfigError::Invalid {
                name: "session_same_site",
                value: raw.to_owned(),
                expected: SAMESITE_EXPECTED,
            },
        ),
    }
}

fn session_key(path: &Path, mode: BuildMode) -> Result<Key, SessionConfigError> {
    match std::fs::read(path) {
        Ok(mut bytes) => {
            let length = bytes.len();
            if !mode.is_debug() && length < SESSION_KEY_MIN_LEN {
                bytes.zeroize();
                return Err(SessionConfigError::KeyTooShort {
                    path: path.to_path_buf(),
                    length,
                    min_len: SESSION_KEY_MIN_LEN,
                });
            }
            let key = Key::derive_from(&bytes);
            bytes.zeroize();
            Ok(key)
        }
        Err(source) if mode.is_debug() => {
            warn!(
                path = %path.display(),
                error = %source,
                "using temporary session key (dev only)"
            );
            Ok(Key::generate())
        }
        Err(source) => Err(SessionConfigError::KeyRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests;
