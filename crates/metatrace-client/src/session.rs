//! Local session persistence.
//!
//! The token and its expiry (epoch milliseconds, as returned by login) are
//! kept in a small JSON file. Reading a session whose expiry has passed
//! deletes the file, which is the proactive logout.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ClientError;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub token: String,
    /// Epoch milliseconds after which the token is considered dead.
    pub expiry: i64,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl StoredSession {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expiry
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `session.json` in the platform data directory.
    pub fn default_location() -> Result<Self, ClientError> {
        let dirs = ProjectDirs::from("org", "MetaTrace", "metatrace").ok_or_else(|| {
            ClientError::Storage("Could not determine a data directory".into())
        })?;
        Ok(Self::new(dirs.data_dir().join(SESSION_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, session: &StoredSession) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ClientError::Storage(format!("Failed to create {parent:?}: {e}")))?;
        }
        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| ClientError::Storage(format!("Failed to serialize session: {e}")))?;
        fs::write(&self.path, json)
            .map_err(|e| ClientError::Storage(format!("Failed to write session: {e}")))?;
        debug!(path = ?self.path, expiry = session.expiry, "Session saved");
        Ok(())
    }

    /// The stored session if it has not expired yet.
    pub fn load(&self) -> Option<StoredSession> {
        self.load_at(Utc::now().timestamp_millis())
    }

    pub fn load_at(&self, now_ms: i64) -> Option<StoredSession> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to read session");
                return None;
            }
        };

        let session: StoredSession = match serde_json::from_slice(&bytes) {
            Ok(session) => session,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Discarding corrupt session file");
                self.clear();
                return None;
            }
        };

        if session.is_expired_at(now_ms) {
            info!("Stored session expired, logging out");
            self.clear();
            return None;
        }
        Some(session)
    }

    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "Session cleared"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?self.path, error = %e, "Failed to remove session"),
        }
    }
}
