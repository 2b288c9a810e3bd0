//! HTTP inbound adapter exposing the mutating REST endpoints.

pub mod avatars;
pub mod contacts;
pub mod error;
pub mod health;
pub mod idempotency;
pub mod legal_documents;
pub mod session;
pub mod session_config;
pub mod state;
pub mod trace;
pub mod users;
mod validation;

use actix_web::web;

pub use error::ApiResult;

/// Register every `/api/v1` handler on `cfg`.
///
/// # Examples
/// ```
/// use actix_web::{App, web};
/// use backend::inbound::http::configure_api;
///
/// let app = App::new().service(web::scope("/api/v1").configure(configure_api));
/// ```
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(avatars::avatar_payload_config())
        .service(users::create_user)
        .service(users::update_profile)
        .service(users::change_password)
        .service(users::request_deletion)
        .service(avatars::upload_avatar)
        .service(avatars::delete_avatar)
        .service(contacts::verify_contact)
        .service(contacts::remove_contact)
        .service(legal_documents::accept_legal_document)
        .service(legal_documents::revoke_legal_document);
}
