//! In-process stand-ins for the pinning, analysis and chain services, plus
//! helpers for driving the router in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use metatrace_chain::{ChainError, ReferenceRegistry};
use metatrace_shared::{Metadata, TokenService};
use metatrace_store::Database;

use crate::analysis::{AnalysisError, MetadataAnalyzer};
use crate::api::{build_router, AppState};
use crate::config::ServerConfig;
use crate::credentials::CredentialStore;
use crate::pinning::{Pinning, PinningError};
use crate::staging::StagingArea;

#[derive(Default)]
pub struct StubPinning {
    counter: AtomicU64,
    pub fail_pin_file: AtomicBool,
    pub fail_pin_json: AtomicBool,
    pub fail_unpin: AtomicBool,
    pub pinned_files: Mutex<Vec<(String, String)>>,
    pub pinned_json: Mutex<Vec<Value>>,
    pub unpinned: Mutex<Vec<String>>,
}

impl StubPinning {
    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn unpinned(&self) -> Vec<String> {
        self.unpinned.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pinning for StubPinning {
    async fn pin_file(&self, _bytes: Bytes, filename: &str) -> Result<String, PinningError> {
        if self.fail_pin_file.load(Ordering::SeqCst) {
            return Err(PinningError::Status {
                status: 401,
                body: "invalid key".into(),
            });
        }
        let cid = format!("bafyfile{}", self.next());
        self.pinned_files
            .lock()
            .unwrap()
            .push((cid.clone(), filename.to_string()));
        Ok(cid)
    }

    async fn pin_json(&self, _name: &str, document: &Value) -> Result<String, PinningError> {
        if self.fail_pin_json.load(Ordering::SeqCst) {
            return Err(PinningError::Status {
                status: 429,
                body: "rate limited".into(),
            });
        }
        self.pinned_json.lock().unwrap().push(document.clone());
        Ok(format!("bafyjson{}", self.next()))
    }

    async fn unpin(&self, content_id: &str) -> Result<(), PinningError> {
        self.unpinned.lock().unwrap().push(content_id.to_string());
        if self.fail_unpin.load(Ordering::SeqCst) {
            return Err(PinningError::Status {
                status: 404,
                body: "not pinned".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct StubAnalyzer {
    pub fail: AtomicBool,
}

#[async_trait]
impl MetadataAnalyzer for StubAnalyzer {
    async fn analyze(
        &self,
        bytes: Bytes,
        filename: &str,
        email: &str,
    ) -> Result<Metadata, AnalysisError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AnalysisError::Status {
                status: 500,
                body: "extraction failed".into(),
            });
        }
        let Value::Object(metadata) = json!({
            "FileSize": bytes.len(),
            "originalFilename": filename,
            "uploaderEmail": email,
        }) else {
            unreachable!()
        };
        Ok(metadata)
    }

    async fn recommend(&self, metadata: &Value) -> Result<Value, AnalysisError> {
        Ok(json!({
            "anomaly_detected": false,
            "recommendations": ["looks consistent"],
            "fields": metadata.as_object().map(|m| m.len()).unwrap_or(0),
        }))
    }
}

#[derive(Default)]
pub struct StubRegistry {
    pub fail: AtomicBool,
    /// Never answer `store_reference`, like a node that stopped responding.
    pub stall: AtomicBool,
    pub references: Mutex<HashMap<u64, String>>,
}

#[async_trait]
impl ReferenceRegistry for StubRegistry {
    async fn store_reference(&self, token_id: u64, content_id: &str) -> Result<String, ChainError> {
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "insufficient funds".into(),
            });
        }
        self.references
            .lock()
            .unwrap()
            .insert(token_id, content_id.to_string());
        Ok(format!("0x{token_id:064x}"))
    }

    async fn get_reference(&self, token_id: u64) -> Result<String, ChainError> {
        self.references
            .lock()
            .unwrap()
            .get(&token_id)
            .cloned()
            .ok_or_else(|| ChainError::Decode(format!("no reference for token {token_id}")))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub pinning: Arc<StubPinning>,
    pub analyzer: Arc<StubAnalyzer>,
    pub registry: Arc<StubRegistry>,
    _dir: TempDir,
}

pub async fn test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        database_path: dir.path().join("metatrace.db"),
        staging_path: dir.path().join("staging"),
        max_upload_size: 1024 * 1024,
        ..ServerConfig::default()
    };

    let credentials = CredentialStore::new(Database::open_at(&config.database_path).unwrap());
    let staging = StagingArea::new(config.staging_path.clone(), config.max_upload_size)
        .await
        .unwrap();
    let pinning = Arc::new(StubPinning::default());
    let analyzer = Arc::new(StubAnalyzer::default());
    let registry = Arc::new(StubRegistry::default());

    let state = AppState::new(
        config,
        credentials,
        TokenService::generate(),
        pinning.clone(),
        analyzer.clone(),
        registry.clone(),
        staging,
    );

    TestApp {
        router: build_router(state.clone()),
        state,
        pinning,
        analyzer,
        registry,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }
}

pub fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

const BOUNDARY: &str = "metatrace-test-boundary";

pub fn upload_request(email: Option<&str>, file: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(email) = email {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"email\"\r\n\r\n{email}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}
