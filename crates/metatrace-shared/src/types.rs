use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque metadata document produced by the analysis service.
///
/// No schema is enforced: keys map to scalars or nested documents exactly as
/// the remote service returned them.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// Internal user identifier. File ownership is keyed by email, not by this id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UploadId(pub Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UploadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A persisted upload, in the camelCase shape the HTTP API returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: UploadId,
    /// Atomically assigned at insert; used as the on-chain token id.
    pub token_id: u64,
    pub email: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub upload_date: DateTime<Utc>,
    /// CID of the raw file on the pinning service.
    pub content_identifier: String,
    pub content_url: String,
    pub metadata: Metadata,
    /// CID of the pinned metadata JSON, set once the chain write succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_content_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_tx_hash: Option<String>,
}

/// Public gateway URL for a content identifier.
pub fn gateway_url(gateway: &str, cid: &str) -> String {
    format!("{}/{}", gateway.trim_end_matches('/'), cid)
}

/// Drop the analysis service's own status fields from its response.
pub fn strip_status_fields(mut metadata: Metadata) -> Metadata {
    metadata.remove(crate::constants::ANALYSIS_STATUS_FIELD);
    metadata
}
