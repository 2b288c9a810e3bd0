//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod account_command;
mod avatar_command;
mod contact_command;
mod idempotency_gate;
mod idempotency_metrics;
mod idempotency_store;
mod legal_document_command;

#[cfg(test)]
pub use account_command::MockAccountCommand;
pub use account_command::{
    AccountCommand, ChangePasswordRequest, CreateUserRequest, DeletionRequest, DeletionTicket,
    FIXTURE_DELETION_GRACE_DAYS, FIXTURE_MIN_PASSWORD_LEN, FixtureAccountCommand, UnitSystem,
    UpdateProfileRequest, UserProfile,
};
#[cfg(test)]
pub use avatar_command::MockAvatarCommand;
pub use avatar_command::{
    AVATAR_CONTENT_TYPES, AVATAR_MAX_BYTES, Avatar, AvatarCommand, FixtureAvatarCommand,
    UploadAvatarRequest,
};
#[cfg(test)]
pub use contact_command::MockContactCommand;
pub use contact_command::{
    ContactCommand, ContactVerification, FIXTURE_CODE_LEN, FixtureContactCommand,
    VerifyContactRequest,
};
pub use idempotency_gate::IdempotencyGate;
#[cfg(test)]
pub use idempotency_metrics::MockIdempotencyMetrics;
pub use idempotency_metrics::{
    IdempotencyMetricLabels, IdempotencyMetrics, IdempotencyMetricsError, NoOpIdempotencyMetrics,
};
#[cfg(test)]
pub use idempotency_store::MockIdempotencyStore;
pub use idempotency_store::{
    IdempotencyStore, IdempotencyStoreError, ReclaimRequest, UnconfiguredIdempotencyStore,
};
#[cfg(test)]
pub use legal_document_command::MockLegalDocumentCommand;
pub use legal_document_command::{
    AcceptLegalDocumentRequest, FIXTURE_DOCUMENTS, FixtureLegalDocumentCommand, LegalAcceptance,
    LegalDocumentCommand,
};
