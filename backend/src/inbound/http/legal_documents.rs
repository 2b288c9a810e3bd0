//! Legal document acceptance HTTP handlers.
//!
//! ```text
//! POST   /api/v1/legal-documents/{documentId}/acceptance  {"version":"2026-01"}
//! DELETE /api/v1/legal-documents/{documentId}/acceptance
//! ```

use actix_web::{HttpRequest, HttpResponse, delete, post, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::domain::ports::{AcceptLegalDocumentRequest, LegalAcceptance};
use crate::domain::{Error, MutationRoute, RequesterId};
use crate::inbound::http::ApiResult;
use crate::inbound::http::idempotency::{Executed, IdempotentRequest, run_idempotent};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::require_non_blank;

/// Request body for accepting a document version.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptLegalDocumentBody {
    #[schema(example = "2026-01")]
    pub version: String,
}

/// Record the caller's acceptance of a document version.
#[utoipa::path(
    post,
    path = "/api/v1/legal-documents/{documentId}/acceptance",
    request_body = AcceptLegalDocumentBody,
    params(
        ("documentId" = String, Path, description = "Document identifier"),
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 200, description = "Acceptance recorded", body = LegalAcceptance),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 404, description = "Unknown document", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["legal-documents"],
    operation_id = "acceptLegalDocument"
)]
#[post("/legal-documents/{document_id}/acceptance")]
pub async fn accept_legal_document(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    path: web::Path<String>,
    payload: web::Json<AcceptLegalDocumentBody>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let document_id = require_non_blank(path.into_inner(), "documentId")?;
    let version = require_non_blank(payload.into_inner().version, "version")?;
    let idempotent = IdempotentRequest::new(
        MutationRoute::AcceptLegalDocument,
        request.headers(),
        RequesterId::user(&user_id),
        &json!({ "documentId": document_id, "version": version }),
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        let acceptance = state
            .legal_documents
            .accept(AcceptLegalDocumentRequest {
                user_id,
                document_id,
                version,
            })
            .await?;
        Executed::ok(&acceptance)
    })
    .await
}

/// Withdraw the caller's acceptance of a document.
#[utoipa::path(
    delete,
    path = "/api/v1/legal-documents/{documentId}/acceptance",
    params(
        ("documentId" = String, Path, description = "Document identifier"),
        ("Idempotency-Key" = Option<String>, Header, description = "Opaque key making retries safe")
    ),
    responses(
        (status = 204, description = "Acceptance withdrawn"),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 404, description = "Unknown document", body = Error),
        (status = 409, description = "Key reused or request in flight", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["legal-documents"],
    operation_id = "revokeLegalDocument"
)]
#[delete("/legal-documents/{document_id}/acceptance")]
pub async fn revoke_legal_document(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let document_id = require_non_blank(path.into_inner(), "documentId")?;
    let idempotent = IdempotentRequest::new(
        MutationRoute::RevokeLegalDocument,
        request.headers(),
        RequesterId::user(&user_id),
        &json!({ "documentId": document_id }),
    )?;

    let gate = state.idempotency.clone();
    run_idempotent(gate.as_ref(), idempotent, || async move {
        state.legal_documents.revoke(&user_id, &document_id).await?;
        Ok(Executed::no_content())
    })
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;
    use rstest::rstest;
    use serde_json::{Value, json};

    use crate::domain::{RecordStatus, UserId};
    use crate::inbound::http::idempotency::IDEMPOTENCY_KEY_HEADER;
    use crate::test_support::TestHarness;
    use crate::test_support::http::session_cookie;

    #[rstest]
    #[case("terms-of-service", StatusCode::OK, RecordStatus::Completed)]
    #[case("cookie-policy", StatusCode::NOT_FOUND, RecordStatus::Failed)]
    #[actix_web::test]
    async fn acceptance_outcome_is_recorded(
        #[case] document: &str,
        #[case] status: StatusCode,
        #[case] record_status: RecordStatus,
    ) {
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

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/v1/legal-documents/{document}/acceptance"))
                .cookie(cookie)
                .insert_header((IDEMPOTENCY_KEY_HEADER, "accept-1"))
                .set_json(json!({"version": "2026-01"}))
                .to_request(),
        )
        .await;

        assert_eq!(res.status(), status);
        assert_eq!(harness.store.records()[0].status, record_status);
        if status == StatusCode::OK {
            let body: Value = test::read_body_json(res).await;
            assert_eq!(body["documentId"], document);
        }
    }
}
