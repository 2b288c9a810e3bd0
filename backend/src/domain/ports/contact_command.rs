//! Driving port for contact channel mutations (secondary emails, phones).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Error, UserId};

/// Request to confirm ownership of a contact channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyContactRequest {
    pub user_id: UserId,
    pub contact_id: String,
    pub code: String,
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactVerification {
    pub contact_id: String,
    pub verified_at: DateTime<Utc>,
}

/// Driving port for contact mutations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactCommand: Send + Sync {
    /// Check a verification code and mark the contact verified.
    async fn verify(&self, request: VerifyContactRequest) -> Result<ContactVerification, Error>;

    /// Detach a contact from the caller's account.
    async fn remove(&self, user_id: &UserId, contact_id: &str) -> Result<(), Error>;
}

/// Length of the numeric verification codes accepted by the fixture.
pub const FIXTURE_CODE_LEN: usize = 6;

/// Fixture accepting any six-digit code.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureContactCommand;

#[async_trait]
impl ContactCommand for FixtureContactCommand {
    async fn verify(&self, request: VerifyContactRequest) -> Result<ContactVerification, Error> {
        let well_formed = request.code.len() == FIXTURE_CODE_LEN
            && request.code.bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            return Err(Error::invalid_request("verification code is invalid"));
        }
        Ok(ContactVerification {
            contact_id: request.contact_id,
            verified_at: Utc::now(),
        })
    }

    async fn remove(&self, _user_id: &UserId, contact_id: &str) -> Result<(), Error> {
        if contact_id.trim().is_empty() {
            return Err(Error::not_found("contact not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("123456", true)]
    #[case("12345", false)]
    #[case("12a456", false)]
    #[tokio::test]
    async fn fixture_checks_code_shape(#[case] code: &str, #[case] accepted: bool) {
        let result = FixtureContactCommand
            .verify(VerifyContactRequest {
                user_id: UserId::random(),
                contact_id: "c-1".to_owned(),
                code: code.to_owned(),
            })
            .await;
        assert_eq!(result.is_ok(), accepted);
    }
}
