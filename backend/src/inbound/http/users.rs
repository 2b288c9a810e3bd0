//! Account HTTP handlers.
//!
//! ```text
//! POST   /api/v1/users                      create an account
//! PATCH  /api/v1/users/me                   update the caller's profile
//! POST   /api/v1/users/me/password          change password
//! POST   /api/v1/users/me/deletion-request  schedule account deletion
//! ```
//!
//! Every handler accepts an optional `Idempotency-Key` header.

use actix_web::{HttpRequest, HttpResponse, patch, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::domain::ports::{
    ChangePasswordRequest, CreateUserRequest, DeletionRequest, DeletionTicket, UnitSystem,
    UpdateProfileRequest, UserProfile,
};
use crate::domain::{Error, MutationRoute, RequesterId};
use crate::inbound::http::ApiResult;
use crate::inbound::http::idempotency::{Executed, IdempotentRequest, run_idempotent};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{optional_non_blank, require_non_blank};

/// Request body for `POST /api/v1/users`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserBody {
    #[schema(example = "ann@example.com")]
    pub email: String,
    #[schema(example = "Ann")]
    pub display_name: String,
    #[schema(example = "en-GB")]
    pub locale: String,
    #[schema(format = Password)]
    pub password: String,
}

/// Request body for `PATCH /api/v1/users/me`. Absent fields are unchanged.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_system: Option<UnitSystem>,
}

/// Request body for `POST /api/v1/users/me/password`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    #[schema(format = Password)]
    pub current_password: String,
    #[schema(format = Password)]
    pub new_password: String,
}

/// Request body for `POST /api/v1/users/me/deletion-request`.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn to_fields<T: Serialize>(body: &T) -> Result<serde_json::Value, Error> {
    serde_json::to_value(body)
        .map_err(|err| Error::internal(format!("failed to encode request fields: {err}")))
}

/// Create an account.
///
/// Anonymous callers share one requester scope, so a retry whose first
/// response (and cookie) was lost still finds its record. The password is
/// fingerprinted as a keyed digest.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserBody,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 201, description = "Account created", body = UserProfile),
        (status = 400, description = "Invalid request", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["users"],
    operation_id = "createUser",
    security([])
)]
#[post("/users")]
pub async fn create_user(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    payload: web::Json<CreateUserBody>,
) -> ApiResult<HttpResponse> {
    let requester = session.requester()?;
    let CreateUserBody {
        email,
        display_name,
        locale,
        password,
    } = payload.into_inner();
    let command = CreateUserRequest {
        email: require_non_blank(email, "email")?,
        display_name: require_non_blank(display_name, "displayName")?,
        locale: require_non_blank(locale, "locale")?,
        password,
    };
    let fields = json!({
        "email": command.email,
        "displayName": command.display_name,
        "locale": command.locale,
        "password": command.password,
    });
    let idempotent = IdempotentRequest::with_credentials(
        MutationRoute::CreateUser,
        request.headers(),
        requester,
        &fields,
        &state.credentials,
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        let profile = state.accounts.create_user(command).await?;
        Executed::created(&profile)
    })
    .await
}

/// Update the caller's profile.
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateProfileBody,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["users"],
    operation_id = "updateProfile"
)]
#[patch("/users/me")]
pub async fn update_profile(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    payload: web::Json<UpdateProfileBody>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let raw = payload.into_inner();
    let body = UpdateProfileBody {
        display_name: optional_non_blank(raw.display_name, "displayName")?,
        locale: optional_non_blank(raw.locale, "locale")?,
        timezone: optional_non_blank(raw.timezone, "timezone")?,
        unit_system: raw.unit_system,
    };
    let idempotent = IdempotentRequest::new(
        MutationRoute::UpdateProfile,
        request.headers(),
        RequesterId::user(&user_id),
        &to_fields(&body)?,
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        let profile = state
            .accounts
            .update_profile(UpdateProfileRequest {
                user_id,
                display_name: body.display_name,
                locale: body.locale,
                timezone: body.timezone,
                unit_system: body.unit_system,
            })
            .await?;
        Executed::ok(&profile)
    })
    .await
}

/// Change the caller's password.
///
/// Both passwords take part in the fingerprint as keyed digests, so a key
/// reused with a different new password conflicts instead of replaying.
#[utoipa::path(
    post,
    path = "/api/v1/users/me/password",
    request_body = ChangePasswordBody,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["users"],
    operation_id = "changePassword"
)]
#[post("/users/me/password")]
pub async fn change_password(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    payload: web::Json<ChangePasswordBody>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let ChangePasswordBody {
        current_password,
        new_password,
    } = payload.into_inner();
    let idempotent = IdempotentRequest::with_credentials(
        MutationRoute::ChangePassword,
        request.headers(),
        RequesterId::user(&user_id),
        &json!({
            "currentPassword": current_password,
            "newPassword": new_password,
        }),
        &state.credentials,
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        state
            .accounts
            .change_password(ChangePasswordRequest {
                user_id,
                current_password,
                new_password,
            })
            .await?;
        Ok(Executed::no_content())
    })
    .await
}

/// Schedule deletion of the caller's account.
#[utoipa::path(
    post,
    path = "/api/v1/users/me/deletion-request",
    request_body = DeletionRequestBody,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 202, description = "Deletion scheduled", body = DeletionTicket),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["users"],
    operation_id = "requestAccountDeletion"
)]
#[post("/users/me/deletion-request")]
pub async fn request_deletion(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    payload: web::Json<DeletionRequestBody>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let body = DeletionRequestBody {
        reason: optional_non_blank(payload.into_inner().reason, "reason")?,
    };
    let idempotent = IdempotentRequest::new(
        MutationRoute::RequestDeletion,
        request.headers(),
        RequesterId::user(&user_id),
        &to_fields(&body)?,
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        let ticket = state
            .accounts
            .request_deletion(DeletionRequest {
                user_id,
                reason: body.reason,
            })
            .await?;
        Executed::accepted(&ticket)
    })
    .await
}
