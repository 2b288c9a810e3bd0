//! Driving port for profile picture mutations.
//!
//! File storage and scanning are the implementation's concern; the port only
//! sees validated bytes and a declared content type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::domain::{Error, UserId};

/// Content types accepted for avatars.
pub const AVATAR_CONTENT_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];
/// Largest avatar accepted, in bytes.
pub const AVATAR_MAX_BYTES: usize = 2 * 1024 * 1024;

/// Request to replace the caller's avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAvatarRequest {
    pub user_id: UserId,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadAvatarRequest {
    /// Lowercase hex SHA-256 of the uploaded bytes.
    pub fn content_sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Stored avatar metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    pub url: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub content_sha256: String,
    pub updated_at: DateTime<Utc>,
}

/// Driving port for avatar mutations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvatarCommand: Send + Sync {
    /// Store a new avatar, replacing any existing one.
    async fn upload(&self, request: UploadAvatarRequest) -> Result<Avatar, Error>;

    /// Remove the caller's avatar. Removing a missing avatar succeeds.
    async fn delete(&self, user_id: &UserId) -> Result<(), Error>;
}

/// Fixture implementation that validates uploads and stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureAvatarCommand;

#[async_trait]
impl AvatarCommand for FixtureAvatarCommand {
    async fn upload(&self, request: UploadAvatarRequest) -> Result<Avatar, Error> {
        if !AVATAR_CONTENT_TYPES.contains(&request.content_type.as_str()) {
            return Err(Error::invalid_request("unsupported avatar content type")
                .with_details(serde_json::json!({ "accepted": AVATAR_CONTENT_TYPES })));
        }
        if request.bytes.is_empty() {
            return Err(Error::invalid_request("avatar body must not be empty"));
        }
        if request.bytes.len() > AVATAR_MAX_BYTES {
            return Err(Error::invalid_request(format!(
                "avatar must be at most {AVATAR_MAX_BYTES} bytes"
            )));
        }
        let content_sha256 = request.content_sha256();
        Ok(Avatar {
            url: format!("/media/avatars/{}/{content_sha256}", request.user_id),
            content_type: request.content_type,
            size_bytes: request.bytes.len() as u64,
            content_sha256,
            updated_at: Utc::now(),
        })
    }

    async fn delete(&self, _user_id: &UserId) -> Result<(), Error> {
        Ok(())
    }
}
