//! Networks a user's wallet may mint on, and where the contract lives on each.

use std::collections::HashMap;

use serde::Serialize;

use crate::signer::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedNetwork {
    pub key: &'static str,
    pub chain_id: u64,
    pub chain_name: &'static str,
    pub native_currency: NativeCurrency,
    pub rpc_urls: &'static [&'static str],
    pub block_explorer_urls: &'static [&'static str],
}

const ETHER: NativeCurrency = NativeCurrency {
    name: "Ether",
    symbol: "ETH",
    decimals: 18,
};

pub const SUPPORTED_NETWORKS: &[SupportedNetwork] = &[
    SupportedNetwork {
        key: "ethereum",
        chain_id: 0x1,
        chain_name: "Ethereum Mainnet",
        native_currency: ETHER,
        rpc_urls: &["https://ethereum-rpc.publicnode.com"],
        block_explorer_urls: &["https://etherscan.io"],
    },
    SupportedNetwork {
        key: "goerli",
        chain_id: 0x5,
        chain_name: "Goerli Testnet",
        native_currency: NativeCurrency {
            name: "Goerli Ether",
            symbol: "GoerliETH",
            decimals: 18,
        },
        rpc_urls: &["https://ethereum-goerli-rpc.publicnode.com"],
        block_explorer_urls: &["https://goerli.etherscan.io"],
    },
    SupportedNetwork {
        key: "avalanche",
        chain_id: 0xa86a,
        chain_name: "Avalanche C-Chain",
        native_currency: NativeCurrency {
            name: "Avalanche",
            symbol: "AVAX",
            decimals: 18,
        },
        rpc_urls: &["https://api.avax.network/ext/bc/C/rpc"],
        block_explorer_urls: &["https://snowtrace.io/"],
    },
    SupportedNetwork {
        key: "arbitrum",
        chain_id: 0xa4b1,
        chain_name: "Arbitrum One",
        native_currency: ETHER,
        rpc_urls: &["https://arb1.arbitrum.io/rpc"],
        block_explorer_urls: &["https://arbiscan.io/"],
    },
    SupportedNetwork {
        key: "base",
        chain_id: 0x2105,
        chain_name: "Base",
        native_currency: ETHER,
        rpc_urls: &["https://mainnet.base.org"],
        block_explorer_urls: &["https://basescan.org/"],
    },
    SupportedNetwork {
        key: "passethub",
        chain_id: 0x190f_1b45,
        chain_name: "Passet Hub",
        native_currency: NativeCurrency {
            name: "Passet",
            symbol: "PAS",
            decimals: 18,
        },
        rpc_urls: &["https://testnet-passet-hub-eth-rpc.polkadot.io"],
        block_explorer_urls: &["https://blockscout-passet-hub.parity-testnet.parity.io/"],
    },
];

/// NFT contract deployed on both Ethereum and Passet Hub.
pub const DEFAULT_NFT_CONTRACT: &str = "0x764c2e97d8AC0BfD86A502cBC1544c7eEec38866";

impl SupportedNetwork {
    /// `0x`-prefixed chain id, the form wallets report and expect.
    pub fn chain_id_hex(&self) -> String {
        chain_id_hex(self.chain_id)
    }

    /// Parameters for `wallet_addEthereumChain`.
    pub fn add_chain_params(&self) -> serde_json::Value {
        serde_json::json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.chain_name,
            "nativeCurrency": self.native_currency,
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": self.block_explorer_urls,
        })
    }
}

pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{chain_id:x}")
}

pub fn network_by_key(key: &str) -> Option<&'static SupportedNetwork> {
    SUPPORTED_NETWORKS.iter().find(|n| n.key == key)
}

pub fn network_by_chain_id(chain_id: u64) -> Option<&'static SupportedNetwork> {
    SUPPORTED_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// A network together with its contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub network: &'static SupportedNetwork,
    pub contract: Address,
}

/// Contract addresses per network key. A network without an entry is known
/// but cannot be minted on.
#[derive(Debug, Clone, Default)]
pub struct Deployments {
    contracts: HashMap<&'static str, Address>,
}

impl Deployments {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Ethereum and Passet Hub carry the default NFT contract.
    pub fn with_defaults() -> Self {
        let mut deployments = Self::empty();
        if let Ok(contract) = DEFAULT_NFT_CONTRACT.parse::<Address>() {
            for key in ["ethereum", "passethub"] {
                deployments = deployments.with_contract(key, contract);
            }
        }
        deployments
    }

    /// Register a contract for `key`. Unknown keys are ignored.
    pub fn with_contract(mut self, key: &str, contract: Address) -> Self {
        if let Some(network) = network_by_key(key) {
            self.contracts.insert(network.key, contract);
        }
        self
    }

    pub fn for_chain(&self, chain_id: u64) -> Option<Deployment> {
        let network = network_by_chain_id(chain_id)?;
        self.contracts
            .get(network.key)
            .map(|contract| Deployment {
                network,
                contract: *contract,
            })
    }

    pub fn is_supported(&self, chain_id: u64) -> bool {
        self.for_chain(chain_id).is_some()
    }
}
