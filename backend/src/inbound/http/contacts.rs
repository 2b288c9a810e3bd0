//! Contact verification HTTP handlers.
//!
//! ```text
//! POST   /api/v1/users/me/contacts/{contactId}/verification  {"code":"123456"}
//! DELETE /api/v1/users/me/contacts/{contactId}
//! ```
//!
//! The path's `contactId` is part of the request fingerprint, so a key used
//! for one contact cannot replay against another.

use actix_web::{HttpRequest, HttpResponse, delete, post, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::domain::ports::{ContactVerification, VerifyContactRequest};
use crate::domain::{Error, MutationRoute, RequesterId};
use crate::inbound::http::ApiResult;
use crate::inbound::http::idempotency::{Executed, IdempotentRequest, run_idempotent};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::require_non_blank;

/// Request body for contact verification.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyContactBody {
    #[schema(example = "123456")]
    pub code: String,
}

/// Confirm ownership of a contact with a one-time code.
#[utoipa::path(
    post,
    path = "/api/v1/users/me/contacts/{contactId}/verification",
    request_body = VerifyContactBody,
    params(
        ("contactId" = String, Path, description = "Contact identifier"),
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 200, description = "Contact verified", body = ContactVerification),
        (status = 400, description = "Invalid code", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["contacts"],
    operation_id = "verifyContact"
)]
#[post("/users/me/contacts/{contact_id}/verification")]
pub async fn verify_contact(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    path: web::Path<String>,
    payload: web::Json<VerifyContactBody>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let contact_id = require_non_blank(path.into_inner(), "contactId")?;
    let code = require_non_blank(payload.into_inner().code, "code")?;
    let idempotent = IdempotentRequest::new(
        MutationRoute::VerifyContact,
        request.headers(),
        RequesterId::user(&user_id),
        &json!({ "contactId": contact_id, "code": code }),
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        let verification = state
            .contacts
            .verify(VerifyContactRequest {
                user_id,
                contact_id,
                code,
            })
            .await?;
        Executed::ok(&verification)
    })
    .await
}

/// Remove a contact from the caller's account.
#[utoipa::path(
    delete,
    path = "/api/v1/users/me/contacts/{contactId}",
    params(
        ("contactId" = String, Path, description = "Contact identifier"),
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 204, description = "Contact removed"),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 404, description = "Unknown contact", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["contacts"],
    operation_id = "removeContact"
)]
#[delete("/users/me/contacts/{contact_id}")]
pub async fn remove_contact(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let contact_id = require_non_blank(path.into_inner(), "contactId")?;
    let idempotent = IdempotentRequest::new(
        MutationRoute::RemoveContact,
        request.headers(),
        RequesterId::user(&user_id),
        &json!({ "contactId": contact_id }),
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        state.contacts.remove(&user_id, &contact_id).await?;
        Ok(Executed::no_content())
    })
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;
    use rstest::rstest;
    use serde_json::json;

    use crate::domain::UserId;
    use crate::inbound::http::idempotency::IDEMPOTENCY_KEY_HEADER;
    use crate::test_support::TestHarness;
    use crate::test_support::http::session_cookie;

    #[rstest]
    #[actix_web::test]
    async fn key_cannot_be_replayed_against_another_contact() {
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
        let verify = |contact: &str| {
            test::TestRequest::post()
                .uri(&format!("/api/v1/users/me/contacts/{contact}/verification"))
                .cookie(cookie.clone())
                .insert_header((IDEMPOTENCY_KEY_HEADER, "verify-1"))
                .set_json(json!({"code": "123456"}))
                .to_request()
        };

        let first = test::call_service(&app, verify("email-1")).await;
        assert_eq!(first.status(), StatusCode::OK);
        let other = test::call_service(&app, verify("email-2")).await;
        assert_eq!(other.status(), StatusCode::CONFLICT);
        assert_eq!(harness.contacts.calls(), 1);
    }

    #[rstest]
    #[actix_web::test]
    async fn removal_replays_no_content() {
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

        for _ in 0..2 {
            let res = test::call_service(
                &app,
                test::TestRequest::delete()
                    .uri("/api/v1/users/me/contacts/phone-1")
                    .cookie(cookie.clone())
                    .insert_header((IDEMPOTENCY_KEY_HEADER, "remove-1"))
                    .to_request(),
            )
            .await;
            assert_eq!(res.status(), StatusCode::NO_CONTENT);
        }
        assert_eq!(harness.contacts.calls(), 1);
    }
}
