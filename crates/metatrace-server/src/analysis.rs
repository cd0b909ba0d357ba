//! Client for the external metadata analysis service.
//!
//! The service is opaque to us: whatever object it returns (minus its own
//! status fields) becomes the upload's metadata.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use metatrace_shared::types::strip_status_fields;
use metatrace_shared::Metadata;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait MetadataAnalyzer: Send + Sync {
    /// Extract metadata from an uploaded file.
    async fn analyze(
        &self,
        bytes: Bytes,
        filename: &str,
        email: &str,
    ) -> Result<Metadata, AnalysisError>;

    /// Ask for recommendations about a metadata document.
    async fn recommend(&self, metadata: &Value) -> Result<Value, AnalysisError>;
}

pub struct HttpAnalyzer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalyzer {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn json_response(response: reqwest::Response) -> Result<Value, AnalysisError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| AnalysisError::Decode(e.to_string()))
    }
}

/// Reduce an `/upload/` response to the metadata object.
///
/// The service nests the extracted fields under `metadata` next to a status
/// `message`; older deployments return the fields at the top level.
pub fn extract_metadata(response: Value) -> Result<Metadata, AnalysisError> {
    let Value::Object(object) = response else {
        return Err(AnalysisError::Decode("expected a JSON object".into()));
    };
    let mut object = strip_status_fields(object);
    match object.remove("metadata") {
        Some(Value::Object(nested)) => Ok(nested),
        Some(other) => {
            object.insert("metadata".into(), other);
            Ok(object)
        }
        None => Ok(object),
    }
}

#[async_trait]
impl MetadataAnalyzer for HttpAnalyzer {
    async fn analyze(
        &self,
        bytes: Bytes,
        filename: &str,
        email: &str,
    ) -> Result<Metadata, AnalysisError> {
        let form = Form::new()
            .part("file", Part::bytes(bytes.to_vec()).file_name(filename.to_string()))
            .text("email", email.to_string());

        let response = self
            .client
            .post(format!("{}/upload/", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AnalysisError::Http(e.to_string()))?;

        let metadata = extract_metadata(Self::json_response(response).await?)?;
        debug!(filename, fields = metadata.len(), "Metadata extracted");
        Ok(metadata)
    }

    async fn recommend(&self, metadata: &Value) -> Result<Value, AnalysisError> {
        let response = self
            .client
            .post(format!("{}/recommend", self.base_url))
            .json(metadata)
            .send()
            .await
            .map_err(|e| AnalysisError::Http(e.to_string()))?;
        Self::json_response(response).await
    }
}
