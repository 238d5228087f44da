//! CSRF state for the OAuth authorization flow.
//!
//! `connect` issues a random state value and persists it; `exchange` must
//! present the same value within the TTL before the code is traded for
//! tokens. The state file lives under the data directory and is deleted on
//! successful verification.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

const STATE_FILE: &str = "oauth_state.json";

/// Minutes a pending state stays valid.
pub const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingState {
    pub state: String,
    pub created_at: DateTime<Utc>,
}

fn state_path(dir: &Path) -> PathBuf {
    dir.join(STATE_FILE)
}

/// Issues a fresh state value and persists it, replacing any previous one.
pub fn issue(dir: &Path, now: DateTime<Utc>) -> anyhow::Result<PendingState> {
    let pending = PendingState {
        state: Uuid::new_v4().to_string(),
        created_at: now,
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("creating data directory {}", dir.display()))?;
    let body = serde_json::to_string_pretty(&pending)?;
    fs::write(state_path(dir), body)
        .with_context(|| format!("writing {}", state_path(dir).display()))?;
    Ok(pending)
}

/// Checks the returned state against the stored one and consumes it.
///
/// Fails if no state was issued, the stored state cannot be read, the TTL
/// has elapsed, or the values differ. The file is only removed on success,
/// so a mistyped value does not burn the pending flow.
pub fn verify_and_consume(dir: &Path, returned: &str, now: DateTime<Utc>) -> Result<(), Error> {
    let path = state_path(dir);
    let body = fs::read_to_string(&path).map_err(|_| Error::InvalidState)?;
    let pending: PendingState = serde_json::from_str(&body).map_err(|_| Error::InvalidState)?;

    if now - pending.created_at > Duration::minutes(STATE_TTL_MINUTES) {
        return Err(Error::InvalidState);
    }
    if pending.state != returned {
        return Err(Error::InvalidState);
    }

    fs::remove_file(&path)
        .with_context(|| format!("removing {}", path.display()))
        .map_err(Error::from)
}
