//! Driving port for account mutations.
//!
//! Account storage, password hashing, and deletion scheduling live behind
//! [`AccountCommand`]. HTTP handlers wrap each call in the idempotency
//! protocol; implementations only need to perform the operation.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{Error, UserId};

/// Preferred measurement system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum UnitSystem {
    Metric,
    Imperial,
}

/// Public view of an account returned by account mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[schema(value_type = String, format = Uuid)]
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub display_name: String,
    pub locale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub unit_system: UnitSystem,
}

/// Request to register a new account.
#[derive(Clone, PartialEq, Eq)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    pub locale: String,
    pub password: String,
}

impl fmt::Debug for CreateUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserRequest")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("locale", &self.locale)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateProfileRequest {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub unit_system: Option<UnitSystem>,
}

/// Request to rotate the account password.
#[derive(Clone, PartialEq, Eq)]
pub struct ChangePasswordRequest {
    pub user_id: UserId,
    pub current_password: String,
    pub new_password: String,
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePasswordRequest")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Request to schedule account deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    pub user_id: UserId,
    pub reason: Option<String>,
}

/// Acknowledgement of a scheduled deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletionTicket {
    pub ticket_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
}

/// Driving port for account mutations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountCommand: Send + Sync {
    /// Register an account and return its profile.
    async fn create_user(&self, request: CreateUserRequest) -> Result<UserProfile, Error>;

    /// Apply a partial profile update and return the new profile.
    async fn update_profile(&self, request: UpdateProfileRequest) -> Result<UserProfile, Error>;

    /// Verify the current password and store the new one.
    async fn change_password(&self, request: ChangePasswordRequest) -> Result<(), Error>;

    /// Schedule the account for deletion.
    async fn request_deletion(&self, request: DeletionRequest) -> Result<DeletionTicket, Error>;
}

/// Minimum password length accepted by the fixture.
pub const FIXTURE_MIN_PASSWORD_LEN: usize = 8;
/// Grace period before a fixture deletion takes effect.
pub const FIXTURE_DELETION_GRACE_DAYS: i64 = 30;

/// Fixture implementation that validates input and echoes it back.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureAccountCommand;

#[async_trait]
impl AccountCommand for FixtureAccountCommand {
    async fn create_user(&self, request: CreateUserRequest) -> Result<UserProfile, Error> {
        if !request.email.contains('@') {
            return Err(Error::invalid_request("email must be a valid address"));
        }
        if request.password.chars().count() < FIXTURE_MIN_PASSWORD_LEN {
            return Err(Error::invalid_request(format!(
                "password must be at least {FIXTURE_MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(UserProfile {
            id: UserId::random(),
            email: Some(request.email),
            display_name: request.display_name,
            locale: request.locale,
            timezone: None,
            unit_system: UnitSystem::Metric,
        })
    }

    async fn update_profile(&self, request: UpdateProfileRequest) -> Result<UserProfile, Error> {
        Ok(UserProfile {
            id: request.user_id,
            email: None,
            display_name: request.display_name.unwrap_or_else(|| "Member".to_owned()),
            locale: request.locale.unwrap_or_else(|| "en-GB".to_owned()),
            timezone: request.timezone,
            unit_system: request.unit_system.unwrap_or(UnitSystem::Metric),
        })
    }

    async fn change_password(&self, request: ChangePasswordRequest) -> Result<(), Error> {
        if request.new_password.chars().count() < FIXTURE_MIN_PASSWORD_LEN {
            return Err(Error::invalid_request(format!(
                "password must be at least {FIXTURE_MIN_PASSWORD_LEN} characters"
            )));
        }
        if request.new_password == request.current_password {
            return Err(Error::invalid_request(
                "new password must differ from the current password",
            ));
        }
        Ok(())
    }

    async fn request_deletion(&self, _request: DeletionRequest) -> Result<DeletionTicket, Error> {
        Ok(DeletionTicket {
            ticket_id: Uuid::new_v4(),
            scheduled_for: Utc::now() + Duration::days(FIXTURE_DELETION_GRACE_DAYS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn create_request(password: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: "ann@example.com".to_owned(),
            display_name: "Ann".to_owned(),
            locale: "en-GB".to_owned(),
            password: password.to_owned(),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn fixture_creates_profile_from_request() {
        let profile = FixtureAccountCommand
            .create_user(create_request("long enough"))
            .await
            .expect("valid request");
        assert_eq!(profile.email.as_deref(), Some("ann@example.com"));
        assert_eq!(profile.display_name, "Ann");
    }

    #[rstest]
    #[tokio::test]
    async fn fixture_rejects_short_passwords() {
        let err = FixtureAccountCommand
            .create_user(create_request("short"))
            .await
            .expect_err("short password");
        assert_eq!(err.code(), crate::domain::ErrorCode::InvalidRequest);
    }

    #[rstest]
    fn debug_output_redacts_passwords() {
        let rendered = format!("{:?}", create_request("hunter2hunter2"));
        assert!(!rendered.contains("hunter2"));

        let change = ChangePasswordRequest {
            user_id: UserId::random(),
            current_password: "old secret".to_owned(),
            new_password: "new secret".to_owned(),
        };
        assert!(!format!("{change:?}").contains("secret"));
    }
}
