//! Network selection for minting.
//!
//! ```text
//! Disconnected --connect--> ConnectedSupported | ConnectedUnsupported
//! ConnectedUnsupported --switch_network--> ConnectedSupported   (approved)
//!                                      \-> ConnectedUnsupported (rejected)
//! any --ChainChanged--> re-evaluated against the deployments
//! any --AccountsChanged([])--> Disconnected
//! ```
//!
//! Minting is only possible from `ConnectedSupported`; everywhere else the
//! switch dialog flag is raised instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use metatrace_chain::abi::encode_mint;
use metatrace_chain::{network_by_key, Address, Deployment, Deployments};

use crate::error::{WalletError, UNRECOGNIZED_CHAIN};
use crate::wallet::{TransactionRequest, WalletEvent, WalletProvider, MINT_FEE_PER_GAS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Disconnected,
    ConnectedSupported { account: Address, chain_id: u64 },
    ConnectedUnsupported { account: Address, chain_id: u64 },
}

pub struct NetworkSelector {
    wallet: Arc<dyn WalletProvider>,
    deployments: Deployments,
    state: NetworkState,
    /// Last chain the wallet reported, known even while disconnected.
    chain_id: Option<u64>,
    show_switch_dialog: AtomicBool,
    minting: AtomicBool,
}

/// Clears the in-flight flag when a mint finishes or is dropped.
struct MintGuard<'a>(&'a AtomicBool);

impl<'a> MintGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, WalletError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| WalletError::MintInFlight)?;
        Ok(Self(flag))
    }
}

impl Drop for MintGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl NetworkSelector {
    pub fn new(wallet: Arc<dyn WalletProvider>, deployments: Deployments) -> Self {
        Self {
            wallet,
            deployments,
            state: NetworkState::Disconnected,
            chain_id: None,
            show_switch_dialog: AtomicBool::new(false),
            minting: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn show_switch_dialog(&self) -> bool {
        self.show_switch_dialog.load(Ordering::Acquire)
    }

    pub fn dismiss_switch_dialog(&self) {
        self.show_switch_dialog.store(false, Ordering::Release);
    }

    pub fn is_minting(&self) -> bool {
        self.minting.load(Ordering::Acquire)
    }

    /// Contract of the active network, if one is deployed there.
    pub fn active_deployment(&self) -> Option<Deployment> {
        self.chain_id.and_then(|id| self.deployments.for_chain(id))
    }

    fn account(&self) -> Option<Address> {
        match self.state {
            NetworkState::Disconnected => None,
            NetworkState::ConnectedSupported { account, .. }
            | NetworkState::ConnectedUnsupported { account, .. } => Some(account),
        }
    }

    fn evaluate(&mut self, account: Option<Address>, chain_id: u64) {
        let supported = self.deployments.is_supported(chain_id);
        self.chain_id = Some(chain_id);
        self.show_switch_dialog.store(!supported, Ordering::Release);
        self.state = match account {
            None => NetworkState::Disconnected,
            Some(account) if supported => NetworkState::ConnectedSupported { account, chain_id },
            Some(account) => NetworkState::ConnectedUnsupported { account, chain_id },
        };
        debug!(chain_id, supported, state = ?self.state, "Network evaluated");
    }

    /// Request accounts and classify the wallet's active chain.
    pub async fn connect(&mut self) -> Result<NetworkState, WalletError> {
        let accounts = self.wallet.request_accounts().await?;
        let account = *accounts.first().ok_or(WalletError::NoAccounts)?;
        let chain_id = self.wallet.chain_id().await?;
        self.evaluate(Some(account), chain_id);
        info!(%account, chain_id, "Wallet connected");
        Ok(self.state)
    }

    /// Ask the wallet to switch to the network named `key`, adding it first
    /// when the wallet does not know it. On rejection the state is left as
    /// it was and the error returned.
    pub async fn switch_network(&mut self, key: &str) -> Result<NetworkState, WalletError> {
        let network =
            network_by_key(key).ok_or_else(|| WalletError::UnknownNetwork(key.to_string()))?;

        let switched = match self.wallet.switch_chain(&network.chain_id_hex()).await {
            Err(e) if e.code() == Some(UNRECOGNIZED_CHAIN) => {
                info!(network = network.chain_name, "Chain unknown to wallet, adding it");
                self.wallet.add_chain(network.add_chain_params()).await
            }
            other => other,
        };
        if let Err(e) = switched {
            warn!(network = network.chain_name, error = %e, "Network switch failed");
            return Err(e);
        }

        info!(network = network.chain_name, "Switched network");
        self.evaluate(self.account(), network.chain_id);
        Ok(self.state)
    }

    pub fn handle_event(&mut self, event: WalletEvent) -> NetworkState {
        match event {
            WalletEvent::ChainChanged(chain_id) => self.evaluate(self.account(), chain_id),
            WalletEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    info!("Disconnected from wallet");
                    self.state = NetworkState::Disconnected;
                }
                Some(&account) => {
                    if let Some(chain_id) = self.chain_id {
                        self.evaluate(Some(account), chain_id);
                    }
                }
            },
        }
        self.state
    }

    /// Apply every queued wallet event. If the receiver lagged, the chain id
    /// is re-read from the wallet instead.
    pub async fn drain_events(
        &mut self,
        events: &mut broadcast::Receiver<WalletEvent>,
    ) -> Result<NetworkState, WalletError> {
        loop {
            match events.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Missed wallet events, re-reading chain id");
                    let chain_id = self.wallet.chain_id().await?;
                    self.evaluate(self.account(), chain_id);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        Ok(self.state)
    }

    /// Mint an NFT pointing at `token_uri` to the connected account.
    ///
    /// Not re-entrant: a second call while one is in flight fails with
    /// [`WalletError::MintInFlight`].
    pub async fn mint(&self, token_uri: &str) -> Result<String, WalletError> {
        let (account, chain_id) = match self.state {
            NetworkState::ConnectedSupported { account, chain_id } => (account, chain_id),
            NetworkState::ConnectedUnsupported { chain_id, .. } => {
                self.show_switch_dialog.store(true, Ordering::Release);
                return Err(WalletError::UnsupportedNetwork(chain_id));
            }
            NetworkState::Disconnected => {
                self.show_switch_dialog.store(true, Ordering::Release);
                return Err(WalletError::NotConnected);
            }
        };
        let deployment = self
            .deployments
            .for_chain(chain_id)
            .ok_or(WalletError::UnsupportedNetwork(chain_id))?;

        let _guard = MintGuard::acquire(&self.minting)?;
        let tx = TransactionRequest {
            from: account,
            to: deployment.contract,
            data: encode_mint(&account, token_uri),
            max_fee_per_gas: MINT_FEE_PER_GAS,
            max_priority_fee_per_gas: MINT_FEE_PER_GAS,
        };

        let tx_hash = self.wallet.send_transaction(&tx).await.map_err(|e| {
            warn!(network = deployment.network.chain_name, error = %e, "Mint failed");
            e
        })?;
        info!(
            network = deployment.network.chain_name,
            contract = %deployment.contract,
            tx_hash = %tx_hash,
            "NFT minted"
        );
        Ok(tx_hash)
    }
}
