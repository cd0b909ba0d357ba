//! Typed client for the MetaTrace HTTP API.
//!
//! Calls that need a bearer token read it from the [`SessionStore`] first;
//! an expired or missing session fails with [`ClientError::SessionExpired`]
//! before any request is made. A 401 or 403 on such a call clears the stored
//! session and surfaces the same generic error.

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use metatrace_shared::{UploadId, UploadRecord};

use crate::error::ClientError;
use crate::session::{SessionStore, StoredSession};

#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    pub message: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub user_id: String,
    pub token: String,
    pub expiry: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub metadata: UploadRecord,
    pub metadata_json_ipfs_hash: String,
    pub blockchain_tx: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub files: Vec<UploadRecord>,
    pub blockchain_metadata: String,
}

#[derive(Deserialize)]
struct FilesResponse {
    files: Vec<UploadRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteAllResponse {
    deleted_count: usize,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, session)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        session: SessionStore,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.load().is_some()
    }

    pub fn logout(&self) {
        self.session.clear();
        info!("Logged out");
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/auth/signup"))
            .json(&json!({ "name": name, "email": email, "password": password }))
            .send()
            .await?;
        decode(resp).await
    }

    /// Log in and persist the returned token with its expiry.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let login: LoginResponse = decode(resp).await?;

        self.session.save(&StoredSession {
            token: login.token.clone(),
            expiry: login.expiry,
            user_id: Some(login.user_id.clone()),
        })?;
        info!(user_id = %login.user_id, "Logged in");
        Ok(login)
    }

    pub async fn profile(&self) -> Result<Profile, ClientError> {
        let resp = self
            .authorized(self.http.get(self.url("/api/auth/profile")))
            .await?;
        decode(resp).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), ClientError> {
        let resp = self
            .authorized(self.http.put(self.url("/api/auth/update-profile")).json(update))
            .await?;
        decode::<Value>(resp).await?;
        Ok(())
    }

    /// The caller's account as the protected route returns it.
    pub async fn protected(&self) -> Result<Value, ClientError> {
        let resp = self
            .authorized(self.http.get(self.url("/api/protected-route")))
            .await?;
        decode(resp).await
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    pub async fn files(&self, email: &str) -> Result<Vec<UploadRecord>, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/files"))
            .query(&[("email", email)])
            .send()
            .await?;
        let files: FilesResponse = decode(resp).await?;
        Ok(files.files)
    }

    pub async fn upload(
        &self,
        email: &str,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResponse, ClientError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = Form::new().text("email", email.to_string()).part("file", part);

        let resp = self
            .http
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn delete_file(&self, id: UploadId) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(self.url("/api/deleteFile"))
            .query(&[("id", id.to_string())])
            .send()
            .await?;
        decode::<Value>(resp).await?;
        Ok(())
    }

    /// Returns the number of records deleted.
    pub async fn delete_all_files(&self, ids: &[UploadId]) -> Result<usize, ClientError> {
        let resp = self
            .http
            .delete(self.url("/api/deleteAllFiles"))
            .json(&json!({ "fileIds": ids }))
            .send()
            .await?;
        let deleted: DeleteAllResponse = decode(resp).await?;
        Ok(deleted.deleted_count)
    }

    pub async fn get_metadata(&self, email: &str) -> Result<MetadataResponse, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/getMetadata"))
            .query(&[("email", email)])
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn recommend(&self, metadata: &Value) -> Result<Value, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/recommend"))
            .json(metadata)
            .send()
            .await?;
        decode(resp).await
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let Some(session) = self.session.load() else {
            debug!("No live session, skipping request");
            return Err(ClientError::SessionExpired);
        };

        let resp = request.bearer_auth(&session.token).send().await?;
        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            debug!(status = %resp.status(), "Session rejected by server");
            self.session.clear();
            return Err(ClientError::SessionExpired);
        }
        Ok(resp)
    }
}

/// Decode a success body, or turn the server's `{"message"}` into an error.
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use super::*;

    fn week_from_now() -> i64 {
        (Utc::now() + Duration::days(7)).timestamp_millis()
    }

    async fn profile_handler(headers: HeaderMap) -> (axum::http::StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        match auth {
            "Bearer good" => (
                axum::http::StatusCode::OK,
                Json(json!({ "name": "Ada", "email": "a@b.com" })),
            ),
            "Bearer stale" => (
                axum::http::StatusCode::FORBIDDEN,
                Json(json!({ "message": "Invalid token" })),
            ),
            _ => (
                axum::http::StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Unauthorized: No token provided" })),
            ),
        }
    }

    async fn spawn_server() -> String {
        let router = Router::new()
            .route(
                "/api/auth/login",
                post(|Json(body): Json<Value>| async move {
                    if body["password"] == "right" {
                        (
                            axum::http::StatusCode::OK,
                            Json(json!({
                                "message": "Login successful",
                                "userId": "u1",
                                "token": "good",
                                "expiry": week_from_now(),
                            })),
                        )
                    } else {
                        (
                            axum::http::StatusCode::UNAUTHORIZED,
                            Json(json!({ "message": "Invalid email or password." })),
                        )
                    }
                }),
            )
            .route("/api/auth/profile", get(profile_handler))
            .route(
                "/api/files",
                get(|| async { Json(json!({ "files": [] })) }),
            )
            .route(
                "/api/deleteFile",
                delete(|| async {
                    (
                        axum::http::StatusCode::NOT_FOUND,
                        Json(json!({ "message": "File not found" })),
                    )
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str) -> (TempDir, ApiClient) {
        let dir = TempDir::new().unwrap();
        let session = SessionStore::new(dir.path().join("session.json"));
        (dir, ApiClient::new(base_url, session))
    }

    #[tokio::test]
    async fn test_login_persists_session() {
        let base = spawn_server().await;
        let (_dir, client) = client(&base);

        let login = client.login("a@b.com", "right").await.unwrap();
        assert_eq!(login.token, "good");
        assert!(client.is_logged_in());

        let profile = client.profile().await.unwrap();
        assert_eq!(
            profile,
            Profile {
                name: "Ada".into(),
                email: "a@b.com".into()
            }
        );
    }

    #[tokio::test]
    async fn test_failed_login_keeps_no_session() {
        let base = spawn_server().await;
        let (_dir, client) = client(&base);

        match client.login("a@b.com", "wrong").await {
            Err(ClientError::Status { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid email or password.");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!client.is_logged_in());
    }

    #[tokio::test]
    async fn test_expired_session_short_circuits() {
        // nothing listens here; reaching the network would be an Http error
        let (_dir, client) = client("http://127.0.0.1:9");
        client
            .session()
            .save(&StoredSession {
                token: "good".into(),
                expiry: Utc::now().timestamp_millis() - 1_000,
                user_id: None,
            })
            .unwrap();

        assert!(matches!(client.profile().await, Err(ClientError::SessionExpired)));
        assert!(!client.session().path().exists());
    }

    #[tokio::test]
    async fn test_rejected_token_clears_session() {
        let base = spawn_server().await;
        let (_dir, client) = client(&base);
        client
            .session()
            .save(&StoredSession {
                token: "stale".into(),
                expiry: week_from_now(),
                user_id: None,
            })
            .unwrap();

        let err = client.profile().await.unwrap_err();
        assert!(matches!(err, ClientError::SessionExpired));
        assert_eq!(err.to_string(), crate::error::SESSION_EXPIRED);
        assert!(!client.is_logged_in());
    }

    #[tokio::test]
    async fn test_server_message_is_surfaced() {
        let base = spawn_server().await;
        let (_dir, client) = client(&base);

        assert!(client.files("a@b.com").await.unwrap().is_empty());
        match client.delete_file(UploadId::new()).await {
            Err(ClientError::Status { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "File not found");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
