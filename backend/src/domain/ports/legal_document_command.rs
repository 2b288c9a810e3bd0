//! Driving port for terms-of-service and privacy policy acceptance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Error, UserId};

/// Request to record acceptance of a specific document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptLegalDocumentRequest {
    pub user_id: UserId,
    pub document_id: String,
    pub version: String,
}

/// Recorded acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegalAcceptance {
    pub document_id: String,
    pub version: String,
    pub accepted_at: DateTime<Utc>,
}

/// Driving port for legal document mutations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LegalDocumentCommand: Send + Sync {
    /// Record that the caller accepted `version` of a document.
    async fn accept(&self, request: AcceptLegalDocumentRequest) -> Result<LegalAcceptance, Error>;

    /// Withdraw the caller's acceptance of a document.
    async fn revoke(&self, user_id: &UserId, document_id: &str) -> Result<(), Error>;
}

/// Documents known to the fixture.
pub const FIXTURE_DOCUMENTS: [&str; 2] = ["terms-of-service", "privacy-policy"];

/// Fixture that knows a fixed set of documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureLegalDocumentCommand;

fn ensure_known(document_id: &str) -> Result<(), Error> {
    if FIXTURE_DOCUMENTS.contains(&document_id) {
        Ok(())
    } else {
        Err(Error::not_found(format!("legal document {document_id} not found")))
    }
}

#[async_trait]
impl LegalDocumentCommand for FixtureLegalDocumentCommand {
    async fn accept(&self, request: AcceptLegalDocumentRequest) -> Result<LegalAcceptance, Error> {
        ensure_known(&request.document_id)?;
        if request.version.trim().is_empty() {
            return Err(Error::invalid_request("version must not be empty"));
        }
        Ok(LegalAcceptance {
            document_id: request.document_id,
            version: request.version,
            accepted_at: Utc::now(),
        })
    }

    async fn revoke(&self, _user_id: &UserId, document_id: &str) -> Result<(), Error> {
        ensure_known(document_id)
    }
}
