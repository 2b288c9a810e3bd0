//! Avatar HTTP handlers.
//!
//! ```text
//! PUT    /api/v1/users/me/avatar   raw image body, Content-Type required
//! DELETE /api/v1/users/me/avatar
//! ```
//!
//! Uploads are fingerprinted by content type and the SHA-256 of the image
//! bytes, so retrying the same file with the same key replays.

use actix_web::http::header::CONTENT_TYPE;
use actix_web::{HttpRequest, HttpResponse, delete, put, web};
use serde_json::json;

use crate::domain::ports::{AVATAR_MAX_BYTES, Avatar, UploadAvatarRequest};
use crate::domain::{Error, MutationRoute, RequesterId};
use crate::inbound::http::ApiResult;
use crate::inbound::http::idempotency::{Executed, IdempotentRequest, run_idempotent};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::blank_field_error;

/// Payload limit for avatar uploads; one byte over the domain maximum so
/// oversize files reach the port and get its error.
pub fn avatar_payload_config() -> web::PayloadConfig {
    web::PayloadConfig::new(AVATAR_MAX_BYTES + 1)
}

fn content_type(request: &HttpRequest) -> Result<String, Error> {
    let raw = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| blank_field_error("Content-Type"))?;
    let essence = raw.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() {
        return Err(blank_field_error("Content-Type"));
    }
    Ok(essence.to_ascii_lowercase())
}

/// Replace the caller's avatar.
#[utoipa::path(
    put,
    path = "/api/v1/users/me/avatar",
    request_body(content = Vec<u8>, content_type = "image/png"),
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 200, description = "Avatar stored", body = Avatar),
        (status = 400, description = "Invalid upload", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 413, description = "Upload too large"),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["avatars"],
    operation_id = "uploadAvatar"
)]
#[put("/users/me/avatar")]
pub async fn upload_avatar(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    body: web::Bytes,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let upload = UploadAvatarRequest {
        user_id: user_id.clone(),
        content_type: content_type(&request)?,
        bytes: body.to_vec(),
    };
    let fields = json!({
        "contentType": upload.content_type,
        "contentSha256": upload.content_sha256(),
    });
    let idempotent = IdempotentRequest::new(
        MutationRoute::UploadAvatar,
        request.headers(),
        RequesterId::user(&user_id),
        &fields,
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        let avatar = state.avatars.upload(upload).await?;
        Executed::ok(&avatar)
    })
    .await
}

/// Remove the caller's avatar.
#[utoipa::path(
    delete,
    path = "/api/v1/users/me/avatar",
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 204, description = "Avatar removed"),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["avatars"],
    operation_id = "deleteAvatar"
)]
#[delete("/users/me/avatar")]
pub async fn delete_avatar(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let idempotent = IdempotentRequest::new(
        MutationRoute::DeleteAvatar,
        request.headers(),
        RequesterId::user(&user_id),
        &json!({}),
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        state.avatars.delete(&user_id).await?;
        Ok(Executed::no_content())
    })
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;
    use rstest::rstest;

    use crate::domain::UserId;
    use crate::inbound::http::idempotency::{IDEMPOTENCY_KEY_HEADER, IDEMPOTENT_REPLAYED_HEADER};
    use crate::test_support::TestHarness;
    use crate::test_support::http::session_cookie;

    fn upload(
        cookie: &actix_web::cookie::Cookie<'static>,
        content_type: &str,
        bytes: &'static [u8],
    ) -> actix_http::Request {
        test::TestRequest::put()
            .uri("/api/v1/users/me/avatar")
            .cookie(cookie.clone())
            .insert_header((IDEMPOTENCY_KEY_HEADER, "avatar-1"))
            .insert_header(("Content-Type", content_type))
            .set_payload(bytes)
            .to_request()
    }

    #[rstest]
    #[actix_web::test]
    async fn same_file_replays_and_different_file_conflicts() {
        let harness = TestHarness::default();
        let app = test::init_service(harness.app()).await;
        let login = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/test/login/{}", UserId::random()))
                .to_request(),
        )
        .await;
        let cookie = session_cookie(&login);

        let first = test::call_service(&app, upload(&cookie, "image/png", b"png-bytes")).await;
        assert_eq!(first.status(), StatusCode::OK);

        let replay =
            test::call_service(&app, upload(&cookie, "image/png; charset=binary", b"png-bytes"))
                .await;
        assert_eq!(replay.status(), StatusCode::OK);
        assert_eq!(
            replay
                .headers()
                .get(IDEMPOTENT_REPLAYED_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );

        let other = test::call_service(&app, upload(&cookie, "image/png", b"other-bytes")).await;
        assert_eq!(other.status(), StatusCode::CONFLICT);
        assert_eq!(harness.avatars.calls(), 1);
    }

    #[rstest]
    #[actix_web::test]
    async fn unsupported_type_fails_and_frees_the_key() {
        let harness = TestHarness::default();
        let app = test::init_service(harness.app()).await;
        let login = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/test/login/{}", UserId::random()))
                .to_request(),
        )
        .await;
        let cookie = session_cookie(&login);

        let rejected = test::call_service(&app, upload(&cookie, "image/gif", b"gif-bytes")).await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

        let accepted = test::call_service(&app, upload(&cookie, "image/png", b"png-bytes")).await;
        assert_eq!(accepted.status(), StatusCode::OK);
        assert_eq!(harness.avatars.calls(), 2);
    }
}
