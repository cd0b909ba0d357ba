//! JSON-RPC transport.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

use crate::error::ChainError;

#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Issue one JSON-RPC call and return its `result` member.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError>;
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, "JSON-RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChainError::Transport(format!("HTTP {status}: {text}")));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}

/// Parse a hex `QUANTITY` such as `"0x1a"`.
pub fn parse_quantity(value: &Value) -> Result<u128, ChainError> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex quantity, got {value}")))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("missing 0x prefix: {text}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| ChainError::Decode(format!("{text}: {e}")))
}

/// Decode hex `DATA` such as `"0xdeadbeef"`.
pub fn parse_data(value: &Value) -> Result<Vec<u8>, ChainError> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex data, got {value}")))?;
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .map_err(|e| ChainError::Decode(e.to_string()))
}
