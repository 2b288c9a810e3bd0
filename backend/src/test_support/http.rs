//! HTTP harness: session middleware, a test login route, and an app wired
//! to recording command doubles over the in-memory record store.

use std::sync::Arc;

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Cookie, Key};
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpResponse, web};
use chrono::{TimeZone, Utc};

use super::{
    InMemoryIdempotencyStore, MutableClock, RecordingAccountCommand, RecordingAvatarCommand,
    RecordingContactCommand, RecordingLegalDocumentCommand,
};
use crate::domain::{CredentialSecret, Error, IdempotencyConfig, IdempotencyService, UserId};
use crate::inbound::http::configure_api;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::{HttpState, HttpStatePorts};

/// Path that logs the session in as the user id in the last segment.
pub const TEST_LOGIN_PATH: &str = "/test/login/{user_id}";

/// Session middleware for tests: fresh key, cookie named `session`, and no
/// `Secure` flag so plain-HTTP test requests carry it.
pub fn test_session_middleware() -> SessionMiddleware<CookieSessionStore> {
    keyed_session_middleware(Key::generate())
}

/// As [`test_session_middleware`], but cookies stay valid across every app
/// built with the same `key`.
pub fn keyed_session_middleware(key: Key) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("session".to_owned())
        .cookie_secure(false)
        .build()
}

/// Session cookie set by `res`.
pub fn session_cookie<B>(res: &ServiceResponse<B>) -> Cookie<'static> {
    res.response()
        .cookies()
        .find(|cookie| cookie.name() == "session")
        .map(Cookie::into_owned)
        .unwrap_or_else(|| panic!("session cookie set"))
}

async fn login_as(session: SessionContext, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let user_id = UserId::new(path.into_inner())
        .map_err(|err| Error::invalid_request(err.to_string()))?;
    session.persist_user(&user_id)?;
    Ok(HttpResponse::NoContent().finish())
}

/// Doubles behind one [`HttpState`].
pub struct TestHarness {
    pub store: Arc<InMemoryIdempotencyStore>,
    pub clock: Arc<MutableClock>,
    pub accounts: Arc<RecordingAccountCommand>,
    pub avatars: Arc<RecordingAvatarCommand>,
    pub contacts: Arc<RecordingContactCommand>,
    pub legal_documents: Arc<RecordingLegalDocumentCommand>,
    config: IdempotencyConfig,
    session_key: Key,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new(IdempotencyConfig::default())
    }
}

impl TestHarness {
    pub fn new(config: IdempotencyConfig) -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            store: Arc::new(InMemoryIdempotencyStore::new()),
            clock: Arc::new(MutableClock::new(start)),
            accounts: Arc::new(RecordingAccountCommand::new()),
            avatars: Arc::default(),
            contacts: Arc::default(),
            legal_documents: Arc::default(),
            config,
            session_key: Key::generate(),
        }
    }

    /// Handler state sharing this harness's doubles.
    pub fn state(&self) -> HttpState {
        let gate = IdempotencyService::with_noop_metrics(
            self.store.clone(),
            self.clock.clone(),
            self.config,
        );
        HttpState::new(
            Arc::new(gate),
            CredentialSecret::derive_from(self.session_key.signing()),
            HttpStatePorts {
                accounts: self.accounts.clone(),
                avatars: self.avatars.clone(),
                contacts: self.contacts.clone(),
                legal_documents: self.legal_documents.clone(),
            },
        )
    }

    /// App exposing the API under `/api/v1` plus [`TEST_LOGIN_PATH`].
    ///
    /// Every app built from one harness shares its session key, so a cookie
    /// issued by one instance is accepted by the next.
    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        > + use<>,
    > {
        App::new()
            .wrap(keyed_session_middleware(self.session_key.clone()))
            .app_data(web::Data::new(self.state()))
            .route(TEST_LOGIN_PATH, web::post().to(login_as))
            .service(web::scope("/api/v1").configure(configure_api))
    }
}
