//! Unit tests for session configuration.

use actix_web::cookie::{Key, SameSite};
use rstest::{fixture, rstest};
use uuid::Uuid;

use super::*;

struct TempKeyFile {
    path: PathBuf,
}

impl TempKeyFile {
    fn new(len: usize) -> Self {
        let path = std::env::temp_dir().join(format!("session-key-{}", Uuid::new_v4()));
        std::fs::write(&path, vec![b'k'; len]).expect("write temp key");
        Self { path }
    }
}

impl Drop for TempKeyFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[fixture]
fn key_file() -> TempKeyFile {
    TempKeyFile::new(SESSION_KEY_MIN_LEN)
}

fn release_toggles(key_file: &TempKeyFile) -> SessionToggles {
    SessionToggles {
        key_file: key_file.path.clone(),
        cookie_secure: Some("true".into()),
        same_site: Some("Strict".into()),
    }
}

#[rstest]
fn release_accepts_complete_settings(key_file: TempKeyFile) {
    let settings =
        session_settings(&release_toggles(&key_file), BuildMode::Release).expect("valid settings");
    assert!(settings.cookie_secure);
    assert_eq!(settings.same_site, SameSite::Strict);
}

#[rstest]
fn release_rejects_missing_cookie_secure(key_file: TempKeyFile) {
    let toggles = SessionToggles {
        cookie_secure: None,
        ..release_toggles(&key_file)
    };
    let err = session_settings(&toggles, BuildMode::Release)
        .err()
        .expect("missing toggle fails");
    assert!(matches!(
        err,
        SessionConfigError::Missing {
            name: "session_cookie_secure"
        }
    ));
}

#[rstest]
#[case(Some("sideways"))]
#[case(None)]
fn release_rejects_bad_same_site(key_file: TempKeyFile, #[case] raw: Option<&str>) {
    let toggles = SessionToggles {
        same_site: raw.map(str::to_owned),
        ..release_toggles(&key_file)
    };
    assert!(session_settings(&toggles, BuildMode::Release).is_err());
}

#[rstest]
#[case(BuildMode::Release, false)]
#[case(BuildMode::Debug, true)]
fn same_site_none_requires_secure_in_release(
    key_file: TempKeyFile,
    #[case] mode: BuildMode,
    #[case] accepted: bool,
) {
    let toggles = SessionToggles {
        cookie_secure: Some("false".into()),
        same_site: Some("None".into()),
        ..release_toggles(&key_file)
    };
    assert_eq!(session_settings(&toggles, mode).is_ok(), accepted);
}

#[rstest]
#[case("1", true)]
#[case("yes", true)]
#[case("TRUE", true)]
#[case("0", false)]
#[case("no", false)]
#[case("False", false)]
fn cookie_secure_accepts_common_spellings(
    key_file: TempKeyFile,
    #[case] raw: &str,
    #[case] expected: bool,
) {
    let toggles = SessionToggles {
        cookie_secure: Some(raw.into()),
        same_site: Some("Lax".into()),
        ..release_toggles(&key_file)
    };
    let settings = session_settings(&toggles, BuildMode::Release).expect("valid settings");
    assert_eq!(settings.cookie_secure, expected);
}

#[rstest]
fn release_rejects_unparseable_cookie_secure(key_file: TempKeyFile) {
    let toggles = SessionToggles {
        cookie_secure: Some("sometimes".into()),
        ..release_toggles(&key_file)
    };
    let err = session_settings(&toggles, BuildMode::Release)
        .err()
        .expect("unparseable toggle fails");
    assert!(matches!(
        err,
        SessionConfigError::Invalid {
            name: "session_cookie_secure",
            ..
        }
    ));
}

#[rstest]
fn debug_tolerates_unparseable_cookie_secure_as_secure() {
    let toggles = SessionToggles {
        cookie_secure: Some("sometimes".into()),
        ..SessionToggles::default()
    };
    let settings = session_settings(&toggles, BuildMode::Debug).expect("debug is lenient");
    assert!(settings.cookie_secure);
}

#[rstest]
fn release_rejects_short_key() {
    let short = TempKeyFile::new(SESSION_KEY_MIN_LEN - 1);
    let err = session_settings(&release_toggles(&short), BuildMode::Release)
        .err()
        .expect("short key fails");
    assert!(matches!(err, SessionConfigError::KeyTooShort { length, .. } if length == SESSION_KEY_MIN_LEN - 1));
}

#[rstest]
fn release_rejects_missing_key_file() {
    let toggles = SessionToggles {
        key_file: std::env::temp_dir().join(format!("absent-{}", Uuid::new_v4())),
        cookie_secure: Some("true".into()),
        same_site: Some("Lax".into()),
    };
    let err = session_settings(&toggles, BuildMode::Release)
        .err()
        .expect("missing key fails");
    assert!(matches!(err, SessionConfigError::KeyRead { .. }));
}

#[rstest]
fn debug_defaults_are_secure_and_lax() {
    let settings =
        session_settings(&SessionToggles::default(), BuildMode::Debug).expect("debug defaults");
    assert!(settings.cookie_secure);
    assert_eq!(settings.same_site, SameSite::Lax);
}

#[rstest]
fn key_file_contents_determine_the_key(key_file: TempKeyFile) {
    let first = session_settings(&release_toggles(&key_file), BuildMode::Release)
        .expect("valid settings");
    let second = session_settings(&release_toggles(&key_file), BuildMode::Release)
        .expect("valid settings");
    assert_eq!(key_fingerprint(&first.key), key_fingerprint(&second.key));
}

#[rstest]
fn fingerprint_is_short_hex() {
    let fingerprint = key_fingerprint(&Key::generate());
    assert_eq!(fingerprint.len(), FINGERPRINT_BYTES * 2);
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
}
