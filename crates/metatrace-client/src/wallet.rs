//! Seam to the user's wallet (an EIP-1193 provider in the browser).
//!
//! The wallet pushes `chainChanged` and `accountsChanged` notifications; they
//! arrive here as [`WalletEvent`]s on a broadcast channel the UI layer
//! subscribes to and feeds into [`crate::network::NetworkSelector`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use metatrace_chain::rpc::quantity;
use metatrace_chain::{to_hex_prefixed, Address};

use crate::error::WalletError;

/// Fee cap the mint transaction offers, 0.01 gwei for both fields.
pub const MINT_FEE_PER_GAS: u128 = 10_000_000;

/// Parse the `0x`-prefixed chain id wallets report.
pub fn parse_chain_id(value: &str) -> Result<u64, WalletError> {
    let digits = value.trim().trim_start_matches("0x");
    u64::from_str_radix(digits, 16).map_err(|e| WalletError::Provider {
        code: -32602,
        message: format!("invalid chain id {value}: {e}"),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    ChainChanged(u64),
    AccountsChanged(Vec<Address>),
}

/// A transaction handed to the wallet for signing and submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionParams {
    from: String,
    to: String,
    data: String,
    max_fee_per_gas: String,
    max_priority_fee_per_gas: String,
}

impl TransactionRequest {
    /// The `eth_sendTransaction` parameter object.
    pub fn to_params(&self) -> Value {
        serde_json::to_value(TransactionParams {
            from: self.from.to_string(),
            to: self.to.to_string(),
            data: to_hex_prefixed(&self.data),
            max_fee_per_gas: quantity(self.max_fee_per_gas),
            max_priority_fee_per_gas: quantity(self.max_priority_fee_per_gas),
        })
        .unwrap_or(Value::Null)
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// `eth_requestAccounts`. Prompts the user when not yet authorised.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    async fn chain_id(&self) -> Result<u64, WalletError>;

    /// `wallet_switchEthereumChain` with a `0x`-prefixed chain id.
    async fn switch_chain(&self, chain_id_hex: &str) -> Result<(), WalletError>;

    /// `wallet_addEthereumChain`.
    async fn add_chain(&self, params: Value) -> Result<(), WalletError>;

    /// `eth_sendTransaction`; returns the transaction hash.
    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<String, WalletError>;

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id("0x190f1b45").unwrap(), 420_420_421);
        assert_eq!(parse_chain_id("0xa86a").unwrap(), 43_114);
        assert!(parse_chain_id("0xzz").is_err());
    }

    #[test]
    fn test_transaction_params_are_hex_quantities() {
        let from: Address = "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f".parse().unwrap();
        let to: Address = "0x764c2e97d8AC0BfD86A502cBC1544c7eEec38866".parse().unwrap();
        let tx = TransactionRequest {
            from,
            to,
            data: vec![0xde, 0xad],
            max_fee_per_gas: MINT_FEE_PER_GAS,
            max_priority_fee_per_gas: MINT_FEE_PER_GAS,
        };

        let params = tx.to_params();
        assert_eq!(params["from"], "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f");
        assert_eq!(params["to"], "0x764c2e97d8ac0bfd86a502cbc1544c7eeec38866");
        assert_eq!(params["data"], "0xdead");
        assert_eq!(params["maxFeePerGas"], "0x989680");
        assert_eq!(params["maxPriorityFeePerGas"], "0x989680");
    }
}
