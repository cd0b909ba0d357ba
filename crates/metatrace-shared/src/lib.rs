//! # metatrace-shared
//!
//! Types and primitives shared by every MetaTrace crate: identifiers, the
//! opaque metadata document, the upload record, signed session tokens and password hashing.

pub mod constants;
pub mod error;
pub mod password;
pub mod session;
pub mod types;

pub use error::{PasswordError, SessionError};
pub use session::{IssuedSession, SessionClaims, TokenService};
pub use types::{Metadata, UploadId, UploadRecord, UserId};
