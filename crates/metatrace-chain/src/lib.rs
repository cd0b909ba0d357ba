// Ethereum-compatible chain access: contract ABI, legacy transaction signing
// and JSON-RPC.

pub mod abi;
pub mod error;
pub mod networks;
pub mod registry;
pub mod rlp;
pub mod rpc;
pub mod signer;
pub mod tx;

pub use error::ChainError;
pub use networks::{
    chain_id_hex, network_by_chain_id, network_by_key, Deployment, Deployments, NativeCurrency,
    SupportedNetwork, SUPPORTED_NETWORKS,
};
pub use registry::{ContractRegistry, ReceiptPolicy, ReferenceRegistry, DEFAULT_GAS_LIMIT};
pub use rpc::{HttpTransport, RpcTransport};
pub use signer::{Address, LocalSigner, RecoverableSignature, TransactionSigner};
pub use tx::{LegacyTransaction, SignedTransaction};

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// `0x`-prefixed lowercase hex.
pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
