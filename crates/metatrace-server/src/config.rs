//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with zero configuration
//! for local development. Secrets (session key, chain signer) are only ever
//! read here and handed to the clients that need them.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use metatrace_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_IPFS_GATEWAY, MAX_UPLOAD_SIZE};

/// Contract holding `storeMetadata`/`getMetadata` on Passet Hub.
pub const DEFAULT_REGISTRY_CONTRACT: &str = "0x1D73f6d2244174D028fcfc17030ae5C41aD3511B";

#[derive(Clone)]
pub struct ServerConfig {
    /// Env: `HTTP_ADDR`, default `0.0.0.0:8080`.
    pub http_addr: SocketAddr,

    /// SQLite file holding users and uploads.
    /// Env: `DATABASE_PATH`, default `./metatrace.db`.
    pub database_path: PathBuf,

    /// Directory where incoming uploads are buffered.
    /// Env: `STAGING_PATH`, default `./staging`.
    pub staging_path: PathBuf,

    /// Env: `MAX_UPLOAD_SIZE` (bytes), default 50 MiB.
    pub max_upload_size: usize,

    /// Ed25519 secret used to sign session tokens.
    /// Env: `SESSION_SIGNING_KEY` (64 hex chars). When unset a random key is
    /// generated and sessions do not survive a restart.
    pub session_signing_key: Option<[u8; 32]>,

    pub pinata_api_url: String,
    pub pinata_api_key: String,
    pub pinata_secret_api_key: String,

    /// Env: `IPFS_GATEWAY_URL`.
    pub ipfs_gateway_url: String,

    /// Base URL of the metadata analysis service.
    /// Env: `ANALYSIS_SERVICE_URL`, default `http://127.0.0.1:8000`.
    pub analysis_service_url: String,

    /// JSON-RPC endpoint of the chain holding the reference contract.
    pub rpc_url: String,

    /// Env: `CONTRACT_ADDRESS`.
    pub contract_address: String,

    /// Hex secp256k1 key for chain writes. Env: `SIGNER_PRIVATE_KEY`.
    pub signer_private_key: Option<String>,

    pub receipt_poll_interval: Duration,
    pub receipt_max_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./metatrace.db"),
            staging_path: PathBuf::from("./staging"),
            max_upload_size: MAX_UPLOAD_SIZE,
            session_signing_key: None,
            pinata_api_url: "https://api.pinata.cloud".to_string(),
            pinata_api_key: String::new(),
            pinata_secret_api_key: String::new(),
            ipfs_gateway_url: DEFAULT_IPFS_GATEWAY.to_string(),
            analysis_service_url: "http://127.0.0.1:8000".to_string(),
            rpc_url: "https://testnet-passet-hub-eth-rpc.polkadot.io/".to_string(),
            contract_address: DEFAULT_REGISTRY_CONTRACT.to_string(),
            signer_private_key: None,
            receipt_poll_interval: Duration::from_millis(1000),
            receipt_max_attempts: 60,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("staging_path", &self.staging_path)
            .field("max_upload_size", &self.max_upload_size)
            .field("session_signing_key", &self.session_signing_key.is_some())
            .field("pinata_api_url", &self.pinata_api_url)
            .field("pinata_credentials", &!self.pinata_api_key.is_empty())
            .field("ipfs_gateway_url", &self.ipfs_gateway_url)
            .field("analysis_service_url", &self.analysis_service_url)
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("signer", &self.signer_private_key.is_some())
            .field("receipt_poll_interval", &self.receipt_poll_interval)
            .field("receipt_max_attempts", &self.receipt_max_attempts)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("STAGING_PATH") {
            config.staging_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("MAX_UPLOAD_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_UPLOAD_SIZE, using default"),
            }
        }

        if let Some(hex_key) = lookup("SESSION_SIGNING_KEY") {
            match parse_hex_key(&hex_key) {
                Ok(key) => config.session_signing_key = Some(key),
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid SESSION_SIGNING_KEY, using a random key");
                }
            }
        }

        if let Some(url) = lookup("PINATA_API_URL") {
            config.pinata_api_url = url;
        }
        if let Some(key) = lookup("PINATA_API_KEY") {
            config.pinata_api_key = key;
        }
        if let Some(secret) = lookup("PINATA_SECRET_API_KEY") {
            config.pinata_secret_api_key = secret;
        }
        if let Some(url) = lookup("IPFS_GATEWAY_URL") {
            config.ipfs_gateway_url = url;
        }
        if let Some(url) = lookup("ANALYSIS_SERVICE_URL") {
            config.analysis_service_url = url;
        }
        if let Some(url) = lookup("RPC_URL") {
            config.rpc_url = url;
        }
        if let Some(addr) = lookup("CONTRACT_ADDRESS") {
            config.contract_address = addr;
        }

        if let Some(key) = lookup("SIGNER_PRIVATE_KEY") {
            if !key.trim().is_empty() {
                config.signer_private_key = Some(key);
            }
        }

        if let Some(val) = lookup("RECEIPT_POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.receipt_poll_interval = Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid RECEIPT_POLL_INTERVAL_MS, using default")
                }
            }
        }

        if let Some(val) = lookup("RECEIPT_MAX_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.receipt_max_attempts = n,
                _ => tracing::warn!(value = %val, "Invalid RECEIPT_MAX_ATTEMPTS, using default"),
            }
        }

        config
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_key(value: &str) -> Result<[u8; 32], String> {
    let value = value.trim();
    if value.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", value.len()));
    }
    let bytes = hex::decode(value).map_err(|e| e.to_string())?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.max_upload_size, 50 * 1024 * 1024);
        assert_eq!(config.analysis_service_url, "http://127.0.0.1:8000");
        assert!(config.session_signing_key.is_none());
        assert!(config.signer_private_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let key = "ab".repeat(32);
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("SESSION_SIGNING_KEY", &key),
            ("RECEIPT_MAX_ATTEMPTS", "5"),
            ("SIGNER_PRIVATE_KEY", "0x46"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.session_signing_key, Some([0xab; 32]));
        assert_eq!(config.receipt_max_attempts, 5);
        assert_eq!(config.signer_private_key.as_deref(), Some("0x46"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("MAX_UPLOAD_SIZE", "0"),
            ("SESSION_SIGNING_KEY", "abcd"),
            ("RECEIPT_MAX_ATTEMPTS", "many"),
            ("SIGNER_PRIVATE_KEY", "  "),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.max_upload_size, defaults.max_upload_size);
        assert!(config.session_signing_key.is_none());
        assert_eq!(config.receipt_max_attempts, 60);
        assert!(config.signer_private_key.is_none());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut config = ServerConfig::default();
        config.pinata_secret_api_key = "super-secret".into();
        config.signer_private_key = Some("46".repeat(32));
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret"));
        assert!(!printed.contains(&"46".repeat(32)));
    }
}
