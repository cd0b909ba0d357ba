use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected RPC response: {0}")]
    Decode(String),

    #[error("Invalid private key")]
    InvalidKey,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("No signing key configured")]
    SignerUnavailable,

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("No receipt for transaction {0} after {1} attempts")]
    ReceiptTimeout(String, u32),
}
