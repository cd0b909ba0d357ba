//! On-chain registry of metadata references keyed by token id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::abi;
use crate::error::ChainError;
use crate::rpc::{parse_data, parse_quantity, RpcTransport};
use crate::signer::{Address, TransactionSigner};
use crate::to_hex_prefixed;
use crate::tx::LegacyTransaction;

/// Gas limit used when `eth_estimateGas` fails.
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;

/// How long to wait for a transaction receipt.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 60,
        }
    }
}

#[async_trait]
pub trait ReferenceRegistry: Send + Sync {
    /// Record `content_id` under `token_id` and return the transaction hash
    /// once it is mined.
    async fn store_reference(&self, token_id: u64, content_id: &str) -> Result<String, ChainError>;

    /// Read the reference stored under `token_id`.
    async fn get_reference(&self, token_id: u64) -> Result<String, ChainError>;
}

/// Registry backed by the `storeMetadata`/`getMetadata` contract.
pub struct ContractRegistry {
    transport: Arc<dyn RpcTransport>,
    signer: Option<Arc<dyn TransactionSigner>>,
    contract: Address,
    receipts: ReceiptPolicy,
}

impl ContractRegistry {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        signer: Option<Arc<dyn TransactionSigner>>,
        contract: Address,
        receipts: ReceiptPolicy,
    ) -> Self {
        Self {
            transport,
            signer,
            contract,
            receipts,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        self.transport.request(method, params).await
    }

    async fn estimate_gas(&self, from: Address, data: &[u8]) -> u64 {
        let params = json!([{
            "from": from.to_string(),
            "to": self.contract.to_string(),
            "data": to_hex_prefixed(data),
        }]);
        let estimate = match self.call("eth_estimateGas", params).await {
            Ok(value) => parse_quantity(&value),
            Err(e) => Err(e),
        };
        match estimate.map(u64::try_from) {
            Ok(Ok(gas)) => {
                debug!(gas, "Estimated gas");
                gas
            }
            Ok(Err(_)) => {
                warn!("Gas estimate out of range, using default of {DEFAULT_GAS_LIMIT}");
                DEFAULT_GAS_LIMIT
            }
            Err(e) => {
                warn!("Gas estimation failed ({e}), using default of {DEFAULT_GAS_LIMIT}");
                DEFAULT_GAS_LIMIT
            }
        }
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Value, ChainError> {
        for attempt in 1..=self.receipts.max_attempts {
            let receipt = self
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if !receipt.is_null() {
                debug!(tx_hash, attempt, "Receipt received");
                return Ok(receipt);
            }
            tokio::time::sleep(self.receipts.interval).await;
        }
        Err(ChainError::ReceiptTimeout(
            tx_hash.to_string(),
            self.receipts.max_attempts,
        ))
    }
}

#[async_trait]
impl ReferenceRegistry for ContractRegistry {
    async fn store_reference(&self, token_id: u64, content_id: &str) -> Result<String, ChainError> {
        let signer = self.signer.as_ref().ok_or(ChainError::SignerUnavailable)?;
        let from = signer.address();
        let data = abi::encode_store_metadata(token_id, content_id);

        let chain_id = parse_quantity(&self.call("eth_chainId", json!([])).await?)?;
        let nonce = parse_quantity(
            &self
                .call("eth_getTransactionCount", json!([from.to_string(), "pending"]))
                .await?,
        )?;
        let gas_price = parse_quantity(&self.call("eth_gasPrice", json!([])).await?)?;
        let gas_limit = self.estimate_gas(from, &data).await;

        let tx = LegacyTransaction {
            nonce: u64::try_from(nonce).map_err(|_| ChainError::Decode("nonce".into()))?,
            gas_price,
            gas_limit,
            to: self.contract,
            value: 0,
            data,
            chain_id: u64::try_from(chain_id).map_err(|_| ChainError::Decode("chainId".into()))?,
        };
        let signed = tx.sign(signer.as_ref())?;
        let tx_hash = to_hex_prefixed(&signed.hash);

        let reported = self
            .call("eth_sendRawTransaction", json!([to_hex_prefixed(&signed.raw)]))
            .await?;
        if reported.as_str().is_some_and(|h| !h.eq_ignore_ascii_case(&tx_hash)) {
            warn!(%tx_hash, %reported, "Node reported a different transaction hash");
        }
        info!(token_id, content_id, %tx_hash, "Submitted storeMetadata transaction");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        match receipt.get("status").and_then(Value::as_str) {
            Some("0x0") => Err(ChainError::Reverted(tx_hash)),
            _ => Ok(tx_hash),
        }
    }

    async fn get_reference(&self, token_id: u64) -> Result<String, ChainError> {
        let params = json!([
            {
                "to": self.contract.to_string(),
                "data": to_hex_prefixed(&abi::encode_get_metadata(token_id)),
            },
            "latest"
        ]);
        let returned = parse_data(&self.call("eth_call", params).await?)?;
        abi::decode_string(&returned)
    }
}

impl std::fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("contract", &self.contract)
            .field("signer", &self.signer.as_ref().map(|s| s.address()))
            .field("receipts", &self.receipts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;
    use crate::signer::LocalSigner;

    /// Answers each method from a queue of canned results and records calls.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<HashMap<String, VecDeque<Result<Value, ChainError>>>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        fn reply(self, method: &str, result: Result<Value, ChainError>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(method.to_string())
                .or_default()
                .push_back(result);
            self
        }

        fn calls_to(&self, method: &str) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == method)
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    #[async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params));
            self.replies
                .lock()
                .unwrap()
                .get_mut(method)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Err(ChainError::Transport(format!("no reply for {method}"))))
        }
    }

    fn signer() -> Arc<dyn TransactionSigner> {
        Arc::new(LocalSigner::from_hex(&"46".repeat(32)).unwrap())
    }

    fn contract() -> Address {
        "0x1D73f6d2244174D028fcfc17030ae5C41aD3511B".parse().unwrap()
    }

    fn fast_receipts() -> ReceiptPolicy {
        ReceiptPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 3,
        }
    }

    fn submission_script() -> ScriptedTransport {
        ScriptedTransport::default()
            .reply("eth_chainId", Ok(json!("0x190f1b45")))
            .reply("eth_getTransactionCount", Ok(json!("0x3")))
            .reply("eth_gasPrice", Ok(json!("0x3b9aca00")))
            .reply("eth_sendRawTransaction", Ok(json!("0x00")))
    }

    #[tokio::test]
    async fn test_store_reference_falls_back_to_default_gas() {
        let transport = Arc::new(
            submission_script()
                .reply(
                    "eth_estimateGas",
                    Err(ChainError::Rpc {
                        code: -32000,
                        message: "execution reverted".into(),
                    }),
                )
                .reply("eth_getTransactionReceipt", Ok(Value::Null))
                .reply("eth_getTransactionReceipt", Ok(json!({ "status": "0x1" }))),
        );
        let signer = signer();
        let registry =
            ContractRegistry::new(transport.clone(), Some(signer.clone()), contract(), fast_receipts());

        let tx_hash = registry.store_reference(7, "bafymeta").await.unwrap();

        let expected = LegacyTransaction {
            nonce: 3,
            gas_price: 1_000_000_000,
            gas_limit: DEFAULT_GAS_LIMIT,
            to: contract(),
            value: 0,
            data: abi::encode_store_metadata(7, "bafymeta"),
            chain_id: 420_420_421,
        }
        .sign(signer.as_ref())
        .unwrap();

        let sent = transport.calls_to("eth_sendRawTransaction");
        assert_eq!(sent, vec![json!([to_hex_prefixed(&expected.raw)])]);
        assert_eq!(tx_hash, to_hex_prefixed(&expected.hash));
        assert_eq!(tx_hash.len(), 66);
        assert_eq!(transport.calls_to("eth_getTransactionReceipt").len(), 2);
    }

    #[tokio::test]
    async fn test_store_reference_uses_estimate() {
        let transport = Arc::new(
            submission_script()
                .reply("eth_estimateGas", Ok(json!("0xc350")))
                .reply("eth_getTransactionReceipt", Ok(json!({ "status": "0x1" }))),
        );
        let registry =
            ContractRegistry::new(transport.clone(), Some(signer()), contract(), fast_receipts());

        registry.store_reference(1, "cid").await.unwrap();

        let estimate_params = transport.calls_to("eth_estimateGas");
        assert_eq!(
            estimate_params[0][0]["to"],
            "0x1d73f6d2244174d028fcfc17030ae5c41ad3511b"
        );
    }

    #[tokio::test]
    async fn test_store_reference_reverted() {
        let transport = Arc::new(
            submission_script()
                .reply("eth_estimateGas", Ok(json!("0xc350")))
                .reply("eth_getTransactionReceipt", Ok(json!({ "status": "0x0" }))),
        );
        let registry = ContractRegistry::new(transport, Some(signer()), contract(), fast_receipts());

        let err = registry.store_reference(1, "cid").await.unwrap_err();
        assert!(matches!(err, ChainError::Reverted(_)));
    }

    #[tokio::test]
    async fn test_store_reference_receipt_timeout() {
        let transport = Arc::new(
            submission_script()
                .reply("eth_estimateGas", Ok(json!("0xc350")))
                .reply("eth_getTransactionReceipt", Ok(Value::Null))
                .reply("eth_getTransactionReceipt", Ok(Value::Null))
                .reply("eth_getTransactionReceipt", Ok(Value::Null)),
        );
        let registry = ContractRegistry::new(transport, Some(signer()), contract(), fast_receipts());

        let err = registry.store_reference(1, "cid").await.unwrap_err();
        assert!(matches!(err, ChainError::ReceiptTimeout(_, 3)));
    }

    #[tokio::test]
    async fn test_store_reference_without_signer() {
        let transport = Arc::new(ScriptedTransport::default());
        let registry = ContractRegistry::new(transport.clone(), None, contract(), fast_receipts());

        let err = registry.store_reference(1, "cid").await.unwrap_err();
        assert!(matches!(err, ChainError::SignerUnavailable));
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rpc_error_propagates() {
        let transport = Arc::new(ScriptedTransport::default().reply(
            "eth_chainId",
            Err(ChainError::Rpc {
                code: -32603,
                message: "internal error".into(),
            }),
        ));
        let registry = ContractRegistry::new(transport, Some(signer()), contract(), fast_receipts());

        let err = registry.store_reference(1, "cid").await.unwrap_err();
        assert!(matches!(err, ChainError::Rpc { code: -32603, .. }));
    }

    #[tokio::test]
    async fn test_get_reference_decodes_string() {
        // offset 0x20, length 4, "abcd"
        let mut returned = vec![0u8; 96];
        returned[31] = 0x20;
        returned[63] = 4;
        returned[64..68].copy_from_slice(b"abcd");

        let transport = Arc::new(
            ScriptedTransport::default().reply("eth_call", Ok(json!(to_hex_prefixed(&returned)))),
        );
        let registry = ContractRegistry::new(transport.clone(), None, contract(), fast_receipts());

        assert_eq!(registry.get_reference(5).await.unwrap(), "abcd");

        let call = &transport.calls_to("eth_call")[0];
        assert_eq!(call[1], "latest");
        assert_eq!(
            call[0]["data"],
            to_hex_prefixed(&abi::encode_get_metadata(5))
        );
    }
}
