//! Content-addressed pinning service client.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PinningError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Stores bytes and JSON documents under content identifiers.
#[async_trait]
pub trait Pinning: Send + Sync {
    async fn pin_file(&self, bytes: Bytes, filename: &str) -> Result<String, PinningError>;

    async fn pin_json(&self, name: &str, document: &Value) -> Result<String, PinningError>;

    async fn unpin(&self, content_id: &str) -> Result<(), PinningError>;
}

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Pinata REST API.
pub struct PinataClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    secret_api_key: String,
}

impl PinataClient {
    pub fn new(api_url: &str, api_key: &str, secret_api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            secret_api_key: secret_api_key.to_string(),
        }
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.secret_api_key)
    }

    async fn send_for_cid(&self, request: reqwest::RequestBuilder) -> Result<String, PinningError> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| PinningError::Http(e.to_string()))?;
        let response = check_status(response).await?;
        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| PinningError::Decode(e.to_string()))?;
        Ok(pinned.ipfs_hash)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PinningError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PinningError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Pinning for PinataClient {
    async fn pin_file(&self, bytes: Bytes, filename: &str) -> Result<String, PinningError> {
        let size = bytes.len();
        let form = Form::new()
            .part("file", Part::bytes(bytes.to_vec()).file_name(filename.to_string()))
            .text("pinataMetadata", json!({ "name": filename }).to_string())
            .text("pinataOptions", json!({ "cidVersion": 1 }).to_string());

        let request = self
            .client
            .post(format!("{}/pinning/pinFileToIPFS", self.api_url))
            .multipart(form);
        let cid = self.send_for_cid(request).await?;
        info!(filename, size, cid = %cid, "Pinned file");
        Ok(cid)
    }

    async fn pin_json(&self, name: &str, document: &Value) -> Result<String, PinningError> {
        let body = json!({
            "pinataMetadata": { "name": name },
            "pinataOptions": { "cidVersion": 1 },
            "pinataContent": document,
        });
        let request = self
            .client
            .post(format!("{}/pinning/pinJSONToIPFS", self.api_url))
            .json(&body);
        let cid = self.send_for_cid(request).await?;
        info!(name, cid = %cid, "Pinned JSON document");
        Ok(cid)
    }

    async fn unpin(&self, content_id: &str) -> Result<(), PinningError> {
        let request = self
            .client
            .delete(format!("{}/pinning/unpin/{}", self.api_url, content_id));
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| PinningError::Http(e.to_string()))?;
        check_status(response).await?;
        debug!(cid = content_id, "Unpinned");
        Ok(())
    }
}
