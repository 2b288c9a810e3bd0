//! Recording command doubles that count how often domain logic runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::{
    AcceptLegalDocumentRequest, AccountCommand, Avatar, AvatarCommand, ChangePasswordRequest,
    ContactCommand, ContactVerification, CreateUserRequest, DeletionRequest, DeletionTicket,
    FixtureAccountCommand, FixtureAvatarCommand, FixtureContactCommand,
    FixtureLegalDocumentCommand, LegalAcceptance, LegalDocumentCommand, UnitSystem,
    UpdateProfileRequest, UploadAvatarRequest, UserProfile, VerifyContactRequest,
};
use crate::domain::{Error, UserId};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("test double mutex poisoned"),
    }
}

/// Shared execution counter, optional latency, and scripted failure.
#[derive(Default)]
struct Recorder {
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    failure: Mutex<Option<Error>>,
}

impl Recorder {
    async fn enter(&self) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.failure).clone();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

macro_rules! recorder_controls {
    ($name:ident) => {
        impl $name {
            /// Number of times domain logic ran.
            pub fn calls(&self) -> usize {
                self.recorder.calls.load(Ordering::SeqCst)
            }

            /// Sleep for `delay` inside every call, widening race windows.
            pub fn set_delay(&self, delay: Option<Duration>) {
                *lock(&self.recorder.delay) = delay;
            }

            /// Fail every call with `error` while set.
            pub fn set_failure(&self, error: Option<Error>) {
                *lock(&self.recorder.failure) = error;
            }
        }
    };
}

/// Stateful account double: profile updates accumulate per user.
#[derive(Default)]
pub struct RecordingAccountCommand {
    recorder: Recorder,
    profiles: Mutex<HashMap<UserId, UserProfile>>,
}

recorder_controls!(RecordingAccountCommand);

impl RecordingAccountCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored profile for `user_id`.
    pub fn profile(&self, user_id: &UserId) -> Option<UserProfile> {
        lock(&self.profiles).get(user_id).cloned()
    }
}

#[async_trait]
impl AccountCommand for RecordingAccountCommand {
    async fn create_user(&self, request: CreateUserRequest) -> Result<UserProfile, Error> {
        self.recorder.enter().await?;
        let profile = FixtureAccountCommand.create_user(request).await?;
        lock(&self.profiles).insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, request: UpdateProfileRequest) -> Result<UserProfile, Error> {
        self.recorder.enter().await?;
        let mut profiles = lock(&self.profiles);
        let profile = profiles
            .entry(request.user_id.clone())
            .or_insert_with(|| UserProfile {
                id: request.user_id.clone(),
                email: None,
                display_name: "Member".to_owned(),
                locale: "en-GB".to_owned(),
                timezone: None,
                unit_system: UnitSystem::Metric,
            });
        if let Some(display_name) = request.display_name {
            profile.display_name = display_name;
        }
        if let Some(locale) = request.locale {
            profile.locale = locale;
        }
        if let Some(timezone) = request.timezone {
            profile.timezone = Some(timezone);
        }
        if let Some(unit_system) = request.unit_system {
            profile.unit_system = unit_system;
        }
        Ok(profile.clone())
    }

    async fn change_password(&self, request: ChangePasswordRequest) -> Result<(), Error> {
        self.recorder.enter().await?;
        FixtureAccountCommand.change_password(request).await
    }

    async fn request_deletion(&self, request: DeletionRequest) -> Result<DeletionTicket, Error> {
        self.recorder.enter().await?;
        FixtureAccountCommand.request_deletion(request).await
    }
}

/// Counting avatar double delegating to the fixture.
#[derive(Default)]
pub struct RecordingAvatarCommand {
    recorder: Recorder,
}

recorder_controls!(RecordingAvatarCommand);

#[async_trait]
impl AvatarCommand for RecordingAvatarCommand {
    async fn upload(&self, request: UploadAvatarRequest) -> Result<Avatar, Error> {
        self.recorder.enter().await?;
        FixtureAvatarCommand.upload(request).await
    }

    async fn delete(&self, user_id: &UserId) -> Result<(), Error> {
        self.recorder.enter().await?;
        FixtureAvatarCommand.delete(user_id).await
    }
}

/// Counting contact double delegating to the fixture.
#[derive(Default)]
pub struct RecordingContactCommand {
    recorder: Recorder,
}

recorder_controls!(RecordingContactCommand);

#[async_trait]
impl ContactCommand for RecordingContactCommand {
    async fn verify(&self, request: VerifyContactRequest) -> Result<ContactVerification, Error> {
        self.recorder.enter().await?;
        FixtureContactCommand.verify(request).await
    }

    async fn remove(&self, user_id: &UserId, contact_id: &str) -> Result<(), Error> {
        self.recorder.enter().await?;
        FixtureContactCommand.remove(user_id, contact_id).await
    }
}

/// Counting legal document double delegating to the fixture.
#[derive(Default)]
pub struct RecordingLegalDocumentCommand {
    recorder: Recorder,
}

recorder_controls!(RecordingLegalDocumentCommand);

#[async_trait]
impl LegalDocumentCommand for RecordingLegalDocumentCommand {
    async fn accept(&self, request: AcceptLegalDocumentRequest) -> Result<LegalAcceptance, Error> {
        self.recorder.enter().await?;
        FixtureLegalDocumentCommand.accept(request).await
    }

    async fn revoke(&self, user_id: &UserId, document_id: &str) -> Result<(), Error> {
        self.recorder.enter().await?;
        FixtureLegalDocumentCommand.revoke(user_id, document_id).await
    }
}
