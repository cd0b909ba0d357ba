//! Transaction signing.
//!
//! The registry only sees the [`TransactionSigner`] trait, so tests can
//! substitute a stub and production keys come from configuration.

use std::str::FromStr;

use k256::ecdsa::SigningKey;

use crate::error::ChainError;
use crate::keccak256;

/// A 20-byte account or contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes =
            hex::decode(hex_part).map_err(|_| ChainError::InvalidAddress(s.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ChainError::InvalidAddress(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// secp256k1 signature with its recovery id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign a 32-byte prehash (already Keccak-256 digested).
    fn sign_hash(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, ChainError>;
}

/// Signer holding a secp256k1 private key in memory.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, ChainError> {
        let key = SigningKey::from_slice(secret).map_err(|_| ChainError::InvalidKey)?;
        let point = key.verifying_key().to_encoded_point(false);
        // uncompressed SEC1 point: 0x04 || X || Y
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        Ok(Self {
            key,
            address: Address(address),
        })
    }

    /// Parse a hex private key, with or without `0x`.
    pub fn from_hex(secret_hex: &str) -> Result<Self, ChainError> {
        let trimmed = secret_hex.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|_| ChainError::InvalidKey)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl TransactionSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_hash(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, ChainError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash)
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_known_key() {
        let signer = LocalSigner::from_hex(&"46".repeat(32)).unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
        );
    }

    #[test]
    fn test_address_parse_display() {
        let addr: Address = "0x1D73f6d2244174D028fcfc17030ae5C41aD3511B".parse().unwrap();
        assert_eq!(addr.to_string(), "0x1d73f6d2244174d028fcfc17030ae5c41ad3511b");
        assert!("0x1234".parse::<Address>().is_err());
        assert!("zz".parse::<Address>().is_err());
    }

    #[test]
    fn test_invalid_key() {
        assert!(LocalSigner::from_hex(&"00".repeat(32)).is_err());
        assert!(LocalSigner::from_hex("not-hex").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = LocalSigner::from_hex(&"46".repeat(32)).unwrap();
        let printed = format!("{signer:?}");
        assert!(!printed.contains(&"46".repeat(32)));
    }
}
