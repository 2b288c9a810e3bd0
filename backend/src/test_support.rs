//! Test utilities for the backend crate.
//!
//! Shared helpers for unit tests (in `src/`) and integration tests (in
//! `tests/`). Compiled only for tests or with the `test-support` feature.

pub mod clock;
pub mod commands;
pub mod http;
pub mod store;

pub use clock::MutableClock;
pub use commands::{
    RecordingAccountCommand, RecordingAvatarCommand, RecordingContactCommand,
    RecordingLegalDocumentCommand,
};
pub use http::TestHarness;
pub use store::InMemoryIdempotencyStore;
