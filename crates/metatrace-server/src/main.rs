//! # metatrace-server
//!
//! HTTP API for MetaTrace.
//!
//! This binary provides:
//! - **Accounts**: signup, login and profile management with stateless
//!   signed session tokens
//! - **Uploads**: files are pinned to IPFS, analysed by the metadata service,
//!   recorded in SQLite and referenced on chain
//! - **File management**: listing, deletion and on-chain metadata lookup

mod analysis;
mod api;
mod auth;
mod config;
mod credentials;
mod error;
mod files;
mod pinning;
mod staging;
mod upload;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use metatrace_chain::{
    Address, ContractRegistry, HttpTransport, LocalSigner, ReceiptPolicy, TransactionSigner,
};
use metatrace_shared::TokenService;
use metatrace_store::Database;

use crate::analysis::HttpAnalyzer;
use crate::api::AppState;
use crate::config::ServerConfig;
use crate::credentials::CredentialStore;
use crate::pinning::PinataClient;
use crate::staging::StagingArea;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,metatrace_server=debug,metatrace_store=info,metatrace_chain=debug")
        }))
        .init();

    info!("Starting MetaTrace server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize storage and session keys
    // -----------------------------------------------------------------------
    let database = Database::open_at(&config.database_path)?;
    let credentials = CredentialStore::new(database);

    let staging = StagingArea::new(config.staging_path.clone(), config.max_upload_size)
        .await?;

    let tokens = match &config.session_signing_key {
        Some(secret) => TokenService::from_secret_bytes(secret),
        None => {
            warn!("SESSION_SIGNING_KEY not set, sessions will not survive a restart");
            TokenService::generate()
        }
    };

    // -----------------------------------------------------------------------
    // 4. External collaborators
    // -----------------------------------------------------------------------
    let pinning = Arc::new(PinataClient::new(
        &config.pinata_api_url,
        &config.pinata_api_key,
        &config.pinata_secret_api_key,
    ));
    if config.pinata_api_key.is_empty() {
        warn!("PINATA_API_KEY not set, pinning requests will be rejected");
    }

    let analyzer = Arc::new(HttpAnalyzer::new(&config.analysis_service_url));

    let signer: Option<Arc<dyn TransactionSigner>> = match &config.signer_private_key {
        Some(key) => {
            let signer = LocalSigner::from_hex(key)?;
            info!(address = %signer.address(), "Chain signer loaded");
            Some(Arc::new(signer))
        }
        None => {
            warn!("SIGNER_PRIVATE_KEY not set, uploads cannot be recorded on chain");
            None
        }
    };
    let contract: Address = config.contract_address.parse()?;
    let registry = Arc::new(ContractRegistry::new(
        Arc::new(HttpTransport::new(config.rpc_url.clone())),
        signer,
        contract,
        ReceiptPolicy {
            interval: config.receipt_poll_interval,
            max_attempts: config.receipt_max_attempts,
        },
    ));

    let http_addr = config.http_addr;
    let app_state = AppState::new(
        config,
        credentials,
        tokens,
        pinning,
        analyzer,
        registry,
        staging,
    );

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
