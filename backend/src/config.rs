//! Application configuration loaded via OrthoConfig.
//!
//! Values come from CLI flags, `FITLOG_*` environment variables, and an
//! optional configuration file, in that order of precedence.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::inbound::http::session_config::SessionToggles;
use crate::outbound::persistence::PoolConfig;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_KEY_FILE: &str = "/var/run/secrets/session_key";

/// Process-wide settings for the HTTP server.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "FITLOG")]
pub struct AppConfig {
    /// Socket address to listen on.
    pub bind_addr: Option<SocketAddr>,
    /// PostgreSQL URL. Without one the server keeps no idempotency records.
    pub database_url: Option<String>,
    /// Upper bound on pooled database connections.
    pub pool_max_size: Option<u32>,
    /// File holding the session signing key (at least 64 bytes).
    pub session_key_file: Option<PathBuf>,
    /// Session cookie `Secure` attribute as `true`/`false` (`1`/`0`,
    /// `yes`/`no` also accepted). Kept as text so an unset value stays unset.
    pub session_cookie_secure: Option<String>,
    /// Session cookie `SameSite` policy: `Strict`, `Lax`, or `None`.
    pub session_same_site: Option<String>,
}

impl AppConfig {
    /// Listen address, defaulting to `0.0.0.0:8080`.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr.unwrap_or(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            DEFAULT_PORT,
        )))
    }

    /// Pool settings when a database is configured.
    pub fn pool_config(&self) -> Option<PoolConfig> {
        let url = self.database_url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        let config = PoolConfig::new(url);
        Some(match self.pool_max_size {
            Some(max_size) => config.with_max_size(max_size),
            None => config,
        })
    }

    /// Raw session toggles for [`crate::inbound::http::session_config::session_settings`].
    pub fn session_toggles(&self) -> SessionToggles {
        SessionToggles {
            key_file: self
                .session_key_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_KEY_FILE)),
            cookie_secure: self.session_cookie_secure.clone(),
            same_site: self.session_same_site.clone(),
        }
    }
}
