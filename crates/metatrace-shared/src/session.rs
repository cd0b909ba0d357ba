//! Stateless session tokens.
//!
//! A token is a bincode-encoded `{claims, signature}` pair, base64url-encoded
//! so it can travel in an `Authorization: Bearer` header. The server signs
//! the claims with its Ed25519 key; nothing is stored server-side.

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::constants::SESSION_TTL_DAYS;
use crate::error::SessionError;
use crate::types::UserId;

/// Identity carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: UserId,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Expiry as Unix epoch milliseconds, the form handed to browsers.
    pub fn expiry_epoch_ms(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignedSession {
    claims: SessionClaims,
    signature: Vec<u8>,
}

/// A freshly issued token together with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expiry_epoch_ms: i64,
    pub claims: SessionClaims,
}

/// Issues and verifies session tokens with a single server key.
#[derive(Clone)]
pub struct TokenService {
    signing_key: SigningKey,
    ttl: Duration,
}

impl TokenService {
    /// Restore the service from a 32-byte Ed25519 secret.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    /// Fresh random key. Tokens do not survive a restart.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: UserId, email: &str) -> Result<IssuedSession, SessionError> {
        self.issue_at(user_id, email, Utc::now())
    }

    /// Issue a token as if the current time were `issued_at`.
    pub fn issue_at(
        &self,
        user_id: UserId,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedSession, SessionError> {
        let claims = SessionClaims {
            user_id,
            email: email.to_string(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };

        let claim_bytes =
            bincode::serialize(&claims).map_err(|e| SessionError::Encoding(e.to_string()))?;
        let signature = self.signing_key.sign(&claim_bytes);

        let signed = SignedSession {
            claims: claims.clone(),
            signature: signature.to_bytes().to_vec(),
        };
        let token_bytes =
            bincode::serialize(&signed).map_err(|e| SessionError::Encoding(e.to_string()))?;

        Ok(IssuedSession {
            token: base64_url_encode(&token_bytes),
            expiry_epoch_ms: claims.expiry_epoch_ms(),
            claims,
        })
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify structure and signature first, then expiry against `now`.
    ///
    /// A tampered token is always `Invalid`, even when its claimed expiry
    /// has also passed.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        let bytes = base64_url_decode(token)?;
        let signed: SignedSession =
            bincode::deserialize(&bytes).map_err(|_| SessionError::Invalid)?;

        let claim_bytes =
            bincode::serialize(&signed.claims).map_err(|_| SessionError::Invalid)?;
        let signature =
            Signature::from_slice(&signed.signature).map_err(|_| SessionError::Invalid)?;

        self.signing_key
            .verifying_key()
            .verify(&claim_bytes, &signature)
            .map_err(|_| SessionError::Invalid)?;

        if now >= signed.claims.expires_at {
            return Err(SessionError::Expired);
        }

        Ok(signed.claims)
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, SessionError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD
        .decode(s.trim())
        .map_err(|_| SessionError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let service = TokenService::generate();
        let user_id = UserId::new();

        let issued = service.issue(user_id, "a@b.com").unwrap();
        let claims = service.verify(&issued.token).unwrap();

        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.email, "a@b.com");
        assert_eq!(claims.expires_at - claims.issued_at, Duration::days(7));
        assert_eq!(issued.expiry_epoch_ms, claims.expires_at.timestamp_millis());
    }

    #[test]
    fn test_expired_token() {
        let service = TokenService::generate();
        // expires one second ago
        let issued_at = Utc::now() - Duration::days(7) - Duration::seconds(1);
        let issued = service.issue_at(UserId::new(), "a@b.com", issued_at).unwrap();

        assert_eq!(service.verify(&issued.token), Err(SessionError::Expired));
    }

    #[test]
    fn test_wrong_key_is_invalid() {
        let service = TokenService::generate();
        let other = TokenService::generate();
        let issued = other.issue(UserId::new(), "a@b.com").unwrap();

        assert_eq!(service.verify(&issued.token), Err(SessionError::Invalid));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let service = TokenService::generate();
        assert_eq!(service.verify("not a token"), Err(SessionError::Invalid));
        assert_eq!(service.verify(""), Err(SessionError::Invalid));
    }

    #[test]
    fn test_tampered_claims_are_invalid() {
        let service = TokenService::generate();
        let issued = service.issue(UserId::new(), "a@b.com").unwrap();

        let bytes = base64_url_decode(&issued.token).unwrap();
        let mut signed: SignedSession = bincode::deserialize(&bytes).unwrap();
        signed.claims.email = "mallory@b.com".to_string();
        let forged = base64_url_encode(&bincode::serialize(&signed).unwrap());

        assert_eq!(service.verify(&forged), Err(SessionError::Invalid));
    }

    #[test]
    fn test_secret_bytes_round_trip() {
        let secret = [7u8; 32];
        let a = TokenService::from_secret_bytes(&secret);
        let b = TokenService::from_secret_bytes(&secret);
        let issued = a.issue(UserId::new(), "a@b.com").unwrap();
        assert!(b.verify(&issued.token).is_ok());
    }
}
