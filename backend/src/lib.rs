//! Fitlog backend library: idempotent mutation protocol for the REST API.
//!
//! The crate is laid out as a hexagon:
//!
//! - [`domain`] holds the idempotency record model, the resolver/persister
//!   service, the static route table, and the ports it depends on.
//! - [`inbound`] adapts the domain to actix-web handlers, headers, and the
//!   per-request [`Trace`] scope.
//! - [`outbound`] provides the PostgreSQL record store and metrics exporters.
//! - [`config`] loads process settings with OrthoConfig.

pub mod config;
pub mod doc;
pub mod domain;
pub mod inbound;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::AppConfig;
pub use doc::ApiDoc;
pub use inbound::http::trace::Trace;
