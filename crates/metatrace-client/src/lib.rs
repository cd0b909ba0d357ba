//! # metatrace-client
//!
//! Client-side half of MetaTrace: the typed HTTP API client with local
//! session persistence, the wallet network-selection state machine that
//! gates minting, and the NFT metadata document minted tokens point at.

pub mod api;
pub mod error;
pub mod network;
pub mod nft;
pub mod session;
pub mod wallet;

pub use api::{ApiClient, LoginResponse, MetadataResponse, Profile, ProfileUpdate, UploadResponse};
pub use error::{ClientError, WalletError};
pub use network::{NetworkSelector, NetworkState};
pub use nft::{NftAttribute, NftMetadata};
pub use session::{SessionStore, StoredSession};
pub use wallet::{TransactionRequest, WalletEvent, WalletProvider};
