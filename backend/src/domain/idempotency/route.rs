//! Static table of mutating endpoints and their deduplication identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Validation errors for [`RouteTemplate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteTemplateValidationError {
    #[error("route template must not be empty")]
    Empty,
    #[error("route template must look like 'METHOD /path', got '{input}'")]
    Malformed { input: String },
}

/// Normalised route identity: HTTP method plus path pattern.
///
/// Path parameters stay as placeholders (`{contactId}`), so every request to
/// the same endpoint shares one template regardless of the concrete target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouteTemplate(String);

impl RouteTemplate {
    /// Validate and construct a [`RouteTemplate`].
    pub fn new(template: impl Into<String>) -> Result<Self, RouteTemplateValidationError> {
        Self::from_owned(template.into())
    }

    fn from_owned(template: String) -> Result<Self, RouteTemplateValidationError> {
        if template.trim().is_empty() {
            return Err(RouteTemplateValidationError::Empty);
        }
        let well_formed = template
            .split_once(' ')
            .is_some_and(|(method, path)| {
                !method.is_empty()
                    && method.bytes().all(|b| b.is_ascii_uppercase())
                    && path.starts_with('/')
                    && !path.contains(char::is_whitespace)
            });
        if !well_formed {
            return Err(RouteTemplateValidationError::Malformed { input: template });
        }
        Ok(Self(template))
    }
}

impl AsRef<str> for RouteTemplate {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl From<RouteTemplate> for String {
    fn from(value: RouteTemplate) -> Self {
        value.0
    }
}

impl TryFrom<String> for RouteTemplate {
    type Error = RouteTemplateValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_owned(value)
    }
}

impl From<MutationRoute> for RouteTemplate {
    fn from(value: MutationRoute) -> Self {
        value.template()
    }
}

/// Every endpoint wrapped by the idempotent mutation protocol.
///
/// # Example
///
/// ```
/// # use backend::domain::MutationRoute;
/// let route = MutationRoute::UpdateProfile;
/// assert_eq!(route.as_str(), "PATCH /api/v1/users/me");
/// assert_eq!(route.fingerprint_fields(), &["displayName", "locale", "timezone", "unitSystem"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationRoute {
    CreateUser,
    UpdateProfile,
    ChangePassword,
    RequestDeletion,
    UploadAvatar,
    DeleteAvatar,
    VerifyContact,
    RemoveContact,
    AcceptLegalDocument,
    RevokeLegalDocument,
}

impl MutationRoute {
    /// All routes, in table order.
    pub const ALL: [MutationRoute; 10] = [
        MutationRoute::CreateUser,
        MutationRoute::UpdateProfile,
        MutationRoute::ChangePassword,
        MutationRoute::RequestDeletion,
        MutationRoute::UploadAvatar,
        MutationRoute::DeleteAvatar,
        MutationRoute::VerifyContact,
        MutationRoute::RemoveContact,
        MutationRoute::AcceptLegalDocument,
        MutationRoute::RevokeLegalDocument,
    ];

    /// Template string stored in the record table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUser => "POST /api/v1/users",
            Self::UpdateProfile => "PATCH /api/v1/users/me",
            Self::ChangePassword => "POST /api/v1/users/me/password",
            Self::RequestDeletion => "POST /api/v1/users/me/deletion-request",
            Self::UploadAvatar => "PUT /api/v1/users/me/avatar",
            Self::DeleteAvatar => "DELETE /api/v1/users/me/avatar",
            Self::VerifyContact => "POST /api/v1/users/me/contacts/{contactId}/verification",
            Self::RemoveContact => "DELETE /api/v1/users/me/contacts/{contactId}",
            Self::AcceptLegalDocument => "POST /api/v1/legal-documents/{documentId}/acceptance",
            Self::RevokeLegalDocument => "DELETE /api/v1/legal-documents/{documentId}/acceptance",
        }
    }

    /// Owned [`RouteTemplate`] for this route.
    pub fn template(&self) -> RouteTemplate {
        RouteTemplate(self.as_str().to_owned())
    }

    /// Payload fields that make two requests "the same request".
    ///
    /// Credentials are listed separately in [`Self::credential_fields`].
    pub fn fingerprint_fields(&self) -> &'static [&'static str] {
        match self {
            Self::CreateUser => &["email", "displayName", "locale"],
            Self::UpdateProfile => &["displayName", "locale", "timezone", "unitSystem"],
            Self::ChangePassword | Self::DeleteAvatar => &[],
            Self::RequestDeletion => &["reason"],
            Self::UploadAvatar => &["contentType", "contentSha256"],
            Self::VerifyContact => &["contactId", "code"],
            Self::RemoveContact => &["contactId"],
            Self::AcceptLegalDocument => &["documentId", "version"],
            Self::RevokeLegalDocument => &["documentId"],
        }
    }

    /// Credential fields that also distinguish requests, but only as keyed
    /// digests (see [`super::fingerprint_with_credentials`]).
    pub fn credential_fields(&self) -> &'static [&'static str] {
        match self {
            Self::CreateUser => &["password"],
            Self::ChangePassword => &["currentPassword", "newPassword"],
            _ => &[],
        }
    }
}

impl fmt::Display for MutationRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a template string names no known route.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mutation route '{input}'")]
pub struct ParseMutationRouteError {
    /// The unrecognised template.
    pub input: String,
}

impl FromStr for MutationRoute {
    type Err = ParseMutationRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|route| route.as_str() == s)
            .copied()
            .ok_or_else(|| ParseMutationRouteError { input: s.to_owned() })
    }
}
