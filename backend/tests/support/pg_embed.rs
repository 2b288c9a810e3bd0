//! Shared embedded PostgreSQL cluster for integration tests.
//!
//! `pg-embed-setup-unpriv` defaults to `/var/tmp` for its install and data
//! directories. When `PG_RUNTIME_DIR` or `PG_DATA_DIR` is missing, both are
//! pointed under the cargo target directory for the duration of bootstrap so
//! the cluster also starts in sandboxes that block writes elsewhere.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use pg_embedded_setup_unpriv::ClusterHandle;

static BOOTSTRAP_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const MAX_ATTEMPTS: u32 = 4;
const RETRY_DELAY_MS: u64 = 500;

fn pg_embed_target_dir() -> PathBuf {
    if let Some(target_dir) = std::env::var_os("CARGO_TARGET_DIR") {
        return PathBuf::from(target_dir).join("pg-embed");
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("target")
        .join("pg-embed")
}

fn is_transient_error(err: &str) -> bool {
    const PATTERNS: [&str; 6] = [
        "connection reset",
        "connection refused",
        "timed out",
        "timeout",
        "temporarily unavailable",
        "error decoding response body",
    ];
    let lower = err.to_lowercase();
    PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Start (or join) the process-wide cluster, retrying transient download
/// failures with exponential backoff.
pub fn shared_cluster() -> Result<&'static ClusterHandle, String> {
    let _bootstrap = BOOTSTRAP_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|err| err.into_inner());

    let needs_override =
        std::env::var_os("PG_RUNTIME_DIR").is_none() || std::env::var_os("PG_DATA_DIR").is_none();
    let _env = needs_override.then(|| {
        let base = pg_embed_target_dir().join(format!("shared-{}", std::process::id()));
        env_lock::lock_env([
            (
                "PG_RUNTIME_DIR",
                Some(base.join("install").to_string_lossy().into_owned()),
            ),
            (
                "PG_DATA_DIR",
                Some(base.join("data").to_string_lossy().into_owned()),
            ),
        ])
    });

    let mut last_error = String::new();
    for attempt in 0..MAX_ATTEMPTS {
        match pg_embedded_setup_unpriv::test_support::shared_cluster_handle() {
            Ok(handle) => return Ok(handle),
            Err(err) => {
                last_error = format!("{err:?}");
                if attempt + 1 == MAX_ATTEMPTS || !is_transient_error(&last_error) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS << attempt));
            }
        }
    }
    Err(last_error)
}
