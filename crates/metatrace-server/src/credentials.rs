//! Credential store adapter: users and their uploads on top of the SQLite
//! store, with password hashing done off the async runtime.

use std::sync::{Arc, Mutex, OnceLock};

use chrono::Utc;
use tracing::{debug, info};

use metatrace_shared::password::{hash_password, verify_password};
use metatrace_shared::{UploadId, UserId};
use metatrace_store::{Database, NewUpload, StoreError, UploadRecord, User, UserUpdate};

use crate::error::ApiError;

const INVALID_CREDENTIALS: &str = "Invalid email or password.";

/// Verified against when the email is unknown, so both login failures cost
/// one Argon2 verification.
static DECOY_HASH: OnceLock<String> = OnceLock::new();

/// Requested profile change.
#[derive(Debug, Clone)]
pub struct ProfileChange {
    pub name: String,
    pub email: String,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<Mutex<Database>>,
}

impl CredentialStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    // The lock is held for one synchronous store call, never across an await.
    pub(crate) fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, StoreError>,
    ) -> Result<T, ApiError> {
        let db = self
            .db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".into()))?;
        Ok(f(&db)?)
    }

    /// Register a user. The email must not be registered yet.
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        if self.with_db(|db| db.find_user_by_email(email))?.is_some() {
            return Err(ApiError::Conflict("User already exists".into()));
        }

        let password_hash = hash_blocking(password.to_string()).await?;
        let user = User {
            id: UserId::new(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            created_at: Utc::now(),
        };

        match self.with_db(|db| db.insert_user(&user)) {
            Err(ApiError::Conflict(_)) => Err(ApiError::Conflict("User already exists".into())),
            other => other,
        }?;

        info!(user_id = %user.id, email = %user.email, "User registered");
        Ok(user)
    }

    /// Check a login. Unknown email and wrong password fail identically.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let Some(user) = self.with_db(|db| db.find_user_by_email(email))? else {
            debug!(email, "Login for unknown email");
            verify_decoy(password.to_string()).await?;
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
        };

        if !verify_blocking(password.to_string(), user.password_hash.clone()).await? {
            debug!(email, "Login with wrong password");
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
        }

        Ok(user)
    }

    pub fn find_user(&self, id: UserId) -> Result<User, ApiError> {
        match self.with_db(|db| db.find_user_by_id(id)) {
            Err(ApiError::NotFound(_)) => Err(ApiError::NotFound("User not found".into())),
            other => other,
        }
    }

    /// Change name and email, and the password when a new one is given. A
    /// new password requires the current one to verify first.
    pub async fn update_profile(&self, id: UserId, change: &ProfileChange) -> Result<(), ApiError> {
        let user = self.find_user(id)?;

        let new_hash = match change.new_password.as_deref().filter(|p| !p.is_empty()) {
            Some(new_password) => {
                let current = change.current_password.clone().unwrap_or_default();
                if !verify_blocking(current, user.password_hash.clone()).await? {
                    return Err(ApiError::Forbidden("Current password is incorrect".into()));
                }
                Some(hash_blocking(new_password.to_string()).await?)
            }
            None => None,
        };

        if change.email != user.email
            && self.with_db(|db| db.count_users_with_email(&change.email))? > 0
        {
            return Err(ApiError::Conflict("Email already in use".into()));
        }

        let update = UserUpdate {
            name: &change.name,
            email: &change.email,
            password_hash: new_hash.as_deref(),
        };
        match self.with_db(|db| db.update_user(id, &update)) {
            Err(ApiError::NotFound(_)) => Err(ApiError::NotFound("User not found".into())),
            Err(ApiError::Conflict(_)) => Err(ApiError::Conflict("Email already in use".into())),
            other => other,
        }?;

        info!(user_id = %id, password_changed = new_hash.is_some(), "Profile updated");
        Ok(())
    }

    /// Uploads owned by `email`, newest first.
    pub fn list_uploads(&self, email: &str) -> Result<Vec<UploadRecord>, ApiError> {
        self.with_db(|db| db.find_uploads_by_email(email))
    }

    pub fn insert_upload(&self, upload: &NewUpload) -> Result<UploadRecord, ApiError> {
        self.with_db(|db| db.insert_upload(upload))
    }

    pub fn get_upload(&self, id: UploadId) -> Result<UploadRecord, ApiError> {
        match self.with_db(|db| db.get_upload(id)) {
            Err(ApiError::NotFound(_)) => Err(ApiError::NotFound("File not found".into())),
            other => other,
        }
    }

    pub fn attach_chain_anchor(
        &self,
        id: UploadId,
        metadata_cid: &str,
        tx_hash: &str,
    ) -> Result<bool, ApiError> {
        self.with_db(|db| db.attach_chain_anchor(id, metadata_cid, tx_hash))
    }

    pub fn delete_upload(&self, id: UploadId) -> Result<(), ApiError> {
        if self.with_db(|db| db.delete_upload(id))? {
            Ok(())
        } else {
            Err(ApiError::NotFound("File not found".into()))
        }
    }

    /// Delete all listed uploads and return how many existed.
    pub fn delete_uploads(&self, ids: &[UploadId]) -> Result<usize, ApiError> {
        let deleted = self.with_db(|db| db.delete_uploads(ids))?;
        if deleted == 0 {
            return Err(ApiError::NotFound("No files found to delete".into()));
        }
        info!(requested = ids.len(), deleted, "Deleted uploads");
        Ok(deleted)
    }
}

async fn hash_blocking(password: String) -> Result<String, ApiError> {
    Ok(tokio::task::spawn_blocking(move || hash_password(&password)).await??)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, ApiError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await??)
}

async fn verify_decoy(password: String) -> Result<(), ApiError> {
    tokio::task::spawn_blocking(move || {
        let hash = match DECOY_HASH.get() {
            Some(hash) => hash,
            None => {
                let hash = hash_password("metatrace-decoy-password")?;
                DECOY_HASH.get_or_init(|| hash)
            }
        };
        verify_password(&password, hash).map(|_| ())
    })
    .await??;
    Ok(())
}
