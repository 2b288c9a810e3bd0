//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every mutating endpoint together with the health
//! probes, the request and response bodies they exchange, and the session
//! cookie security scheme. Each mutating operation also documents the
//! optional `Idempotency-Key` request header.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::ports::{
    Avatar, ContactVerification, DeletionTicket, LegalAcceptance, UnitSystem, UserProfile,
};
use crate::domain::{Error, ErrorCode};
use crate::inbound::http::contacts::VerifyContactBody;
use crate::inbound::http::legal_documents::AcceptLegalDocumentBody;
use crate::inbound::http::users::{
    ChangePasswordBody, CreateUserBody, DeletionRequestBody, UpdateProfileBody,
};

/// Enrich the generated document with the session cookie security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "SessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "session",
                "Session cookie identifying the caller.",
            ))),
        );
    }
}

/// OpenAPI document for the REST API.
/// Swagger UI is enabled in debug builds only.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Fitlog backend API",
        description = "Account mutations with idempotent retry semantics, plus health probes.",
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("SessionCookie" = [])),
    paths(
        crate::inbound::http::users::create_user,
        crate::inbound::http::users::update_profile,
        crate::inbound::http::users::change_password,
        crate::inbound::http::users::request_deletion,
        crate::inbound::http::avatars::upload_avatar,
        crate::inbound::http::avatars::delete_avatar,
        crate::inbound::http::contacts::verify_contact,
        crate::inbound::http::contacts::remove_contact,
        crate::inbound::http::legal_documents::accept_legal_document,
        crate::inbound::http::legal_documents::revoke_legal_document,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        Error,
        ErrorCode,
        UserProfile,
        UnitSystem,
        DeletionTicket,
        Avatar,
        ContactVerification,
        LegalAcceptance,
        CreateUserBody,
        UpdateProfileBody,
        ChangePasswordBody,
        DeletionRequestBody,
        VerifyContactBody,
        AcceptLegalDocumentBody,
    )),
    tags(
        (name = "users", description = "Account lifecycle"),
        (name = "avatars", description = "Profile pictures"),
        (name = "contacts", description = "Contact point verification"),
        (name = "legal-documents", description = "Terms and policy acceptance"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use utoipa::openapi::RefOr;
    use utoipa::openapi::path::ParameterIn;
    use utoipa::openapi::schema::Schema;

    fn assert_object_schema_has_field(schema: &RefOr<Schema>, field: &str) {
        match schema {
            RefOr::T(Schema::Object(obj)) => {
                assert!(
                    obj.properties.contains_key(field),
                    "schema should have field '{field}'"
                );
            }
            _ => panic!("expected Object schema"),
        }
    }

    #[test]
    fn error_schema_exposes_code_and_message() {
        let doc = ApiDoc::openapi();
        let schemas = &doc.components.as_ref().expect("components").schemas;
        let error = schemas.get("Error").expect("Error schema");
        assert_object_schema_has_field(error, "code");
        assert_object_schema_has_field(error, "message");
    }

    #[rstest]
    #[case("/api/v1/users")]
    #[case("/api/v1/users/me")]
    #[case("/api/v1/users/me/password")]
    #[case("/api/v1/users/me/deletion-request")]
    #[case("/api/v1/users/me/avatar")]
    #[case("/api/v1/users/me/contacts/{contactId}/verification")]
    #[case("/api/v1/users/me/contacts/{contactId}")]
    #[case("/api/v1/legal-documents/{documentId}/acceptance")]
    fn mutating_paths_document_the_idempotency_header(#[case] path: &str) {
        let doc = ApiDoc::openapi();
        let item = doc.paths.paths.get(path).expect("documented path");
        let operations = [&item.post, &item.put, &item.patch, &item.delete];
        let mut seen = 0;
        for operation in operations.into_iter().flatten() {
            seen += 1;
            let parameters = operation.parameters.as_ref().expect("parameters");
            assert!(
                parameters.iter().any(|p| {
                    p.name == "Idempotency-Key" && matches!(p.parameter_in, ParameterIn::Header)
                }),
                "{path} should document Idempotency-Key"
            );
        }
        assert!(seen > 0, "{path} should expose a mutating operation");
    }
}
