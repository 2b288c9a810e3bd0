//! Shared HTTP adapter state.
//!
//! Handlers receive [`HttpState`] through `web::Data` and depend only on
//! domain ports, so they stay testable without I/O.

use std::sync::Arc;

use crate::domain::CredentialSecret;
use crate::domain::ports::{
    AccountCommand, AvatarCommand, ContactCommand, FixtureAccountCommand, FixtureAvatarCommand,
    FixtureContactCommand, FixtureLegalDocumentCommand, IdempotencyGate, LegalDocumentCommand,
};

/// Domain command ports backing the mutating endpoints.
#[derive(Clone)]
pub struct HttpStatePorts {
    pub accounts: Arc<dyn AccountCommand>,
    pub avatars: Arc<dyn AvatarCommand>,
    pub contacts: Arc<dyn ContactCommand>,
    pub legal_documents: Arc<dyn LegalDocumentCommand>,
}

impl HttpStatePorts {
    /// Ports backed by the in-process fixtures.
    pub fn fixtures() -> Self {
        Self {
            accounts: Arc::new(FixtureAccountCommand),
            avatars: Arc::new(FixtureAvatarCommand),
            contacts: Arc::new(FixtureContactCommand),
            legal_documents: Arc::new(FixtureLegalDocumentCommand),
        }
    }
}

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub idempotency: Arc<dyn IdempotencyGate>,
    /// Keys the credential digests inside request fingerprints.
    pub credentials: CredentialSecret,
    pub accounts: Arc<dyn AccountCommand>,
    pub avatars: Arc<dyn AvatarCommand>,
    pub contacts: Arc<dyn ContactCommand>,
    pub legal_documents: Arc<dyn LegalDocumentCommand>,
}

impl HttpState {
    /// Construct state from an idempotency gate, the credential secret, and
    /// the command ports.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    ///
    /// use backend::domain::ports::UnconfiguredIdempotencyStore;
    /// use backend::domain::{CredentialSecret, IdempotencyConfig, IdempotencyService};
    /// use backend::inbound::http::state::{HttpState, HttpStatePorts};
    ///
    /// let gate = IdempotencyService::with_noop_metrics(
    ///     Arc::new(UnconfiguredIdempotencyStore),
    ///     Arc::new(mockable::DefaultClock),
    ///     IdempotencyConfig::default(),
    /// );
    /// let state = HttpState::new(
    ///     Arc::new(gate),
    ///     CredentialSecret::derive_from(b"session key"),
    ///     HttpStatePorts::fixtures(),
    /// );
    /// let _accounts = state.accounts.clone();
    /// ```
    pub fn new(
        idempotency: Arc<dyn IdempotencyGate>,
        credentials: CredentialSecret,
        ports: HttpStatePorts,
    ) -> Self {
        let HttpStatePorts {
            accounts,
            avatars,
            contacts,
            legal_documents,
        } = ports;
        Self {
            idempotency,
            credentials,
            accounts,
            avatars,
            contacts,
            legal_documents,
        }
    }
}
