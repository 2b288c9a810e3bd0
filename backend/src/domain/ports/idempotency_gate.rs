//! Driving port for the idempotent mutation protocol.
//!
//! HTTP handlers depend on [`IdempotencyGate`] rather than on the concrete
//! service; tests wire the service over an in-memory store.

use async_trait::async_trait;

use crate::domain::{Error, IdempotencyClaim, ResolveOutcome, ResolveRequest, StoredResponse};

/// Resolve, persist, and abandon operations offered to inbound adapters.
#[async_trait]
pub trait IdempotencyGate: Send + Sync {
    /// Classify a request before any domain logic runs.
    async fn resolve(&self, request: ResolveRequest) -> Result<ResolveOutcome, Error>;

    /// Record the successful response for a claim. `None` is a no-op.
    async fn persist(
        &self,
        claim: Option<&IdempotencyClaim>,
        response: &StoredResponse,
    ) -> Result<(), Error>;

    /// Release a claim whose operation failed so a retry can reclaim it.
    async fn abandon(&self, claim: Option<&IdempotencyClaim>) -> Result<(), Error>;
}
