use thiserror::Error;

use metatrace_chain::ChainError;

/// Message shown for every session failure. The precise reason is only
/// logged.
pub const SESSION_EXPIRED: &str = "Session expired. Please log in again.";

/// EIP-1193 code for a request the user rejected in the wallet.
pub const USER_REJECTED: i64 = 4001;

/// Wallet code for `wallet_switchEthereumChain` on a chain it does not know.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("No wallet available")]
    Unavailable,

    #[error("Wallet returned no accounts")]
    NoAccounts,

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("User rejected the request")]
    Rejected,

    #[error("Wallet error {code}: {message}")]
    Provider { code: i64, message: String },

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("No contract deployed on chain 0x{0:x}")]
    UnsupportedNetwork(u64),

    #[error("A mint is already in progress")]
    MintInFlight,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl WalletError {
    /// Normalise a raw provider error, folding code 4001 into `Rejected`.
    pub fn provider(code: i64, message: impl Into<String>) -> Self {
        if code == USER_REJECTED {
            WalletError::Rejected
        } else {
            WalletError::Provider {
                code,
                message: message.into(),
            }
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            WalletError::Rejected => Some(USER_REJECTED),
            WalletError::Provider { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Session expired. Please log in again.")]
    SessionExpired,

    #[error("Request failed: {0}")]
    Http(String),

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Http(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_normalised() {
        assert!(matches!(
            WalletError::provider(4001, "User denied"),
            WalletError::Rejected
        ));
        let err = WalletError::provider(UNRECOGNIZED_CHAIN, "Unrecognized chain ID");
        assert_eq!(err.code(), Some(4902));
    }

    #[test]
    fn test_session_message_is_generic() {
        assert_eq!(ClientError::SessionExpired.to_string(), SESSION_EXPIRED);
    }
}
