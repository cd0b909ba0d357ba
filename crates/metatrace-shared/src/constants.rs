/// Application name
pub const APP_NAME: &str = "MetaTrace";

/// Session tokens are valid for this many days after issuance
pub const SESSION_TTL_DAYS: i64 = 7;

/// Maximum upload size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Public IPFS gateway used to build content URLs
pub const DEFAULT_IPFS_GATEWAY: &str = "https://gateway.pinata.cloud/ipfs";

/// Field the analysis service adds to its responses; never persisted
pub const ANALYSIS_STATUS_FIELD: &str = "message";

/// Description embedded in minted NFT metadata
pub const NFT_DESCRIPTION: &str = "Metadata generated by MetaTrace platform";
