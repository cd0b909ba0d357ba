//! Domain model structs persisted in the SQLite database.

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use metatrace_shared::UploadRecord;
use metatrace_shared::{Metadata, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account. Email is unique and is the identifier every file
/// query uses.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Argon2id PHC string. Never leaves the server.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Partial profile change. `password_hash` is already hashed.
#[derive(Debug, Clone)]
pub struct UserUpdate<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// An upload about to be inserted. The content identifier is mandatory: a
/// row is never written before its file is pinned.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub email: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub upload_date: DateTime<Utc>,
    pub content_identifier: String,
    pub content_url: String,
    pub metadata: Metadata,
}
