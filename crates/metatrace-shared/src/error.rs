use thiserror::Error;

/// Why a session token was rejected.
///
/// Both variants mean "re-authenticate" to callers; the distinction is kept
/// so that logs can tell a stale session from a forged one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session token has expired")]
    Expired,

    #[error("Session token is invalid")]
    Invalid,

    #[error("Session token encoding failed: {0}")]
    Encoding(String),
}

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Stored password hash is malformed")]
    MalformedHash,
}
