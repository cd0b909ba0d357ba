use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::Method,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use metatrace_chain::ReferenceRegistry;
use metatrace_shared::TokenService;

use crate::analysis::MetadataAnalyzer;
use crate::auth;
use crate::config::ServerConfig;
use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::files;
use crate::pinning::Pinning;
use crate::staging::StagingArea;
use crate::upload::{self, UploadOrchestrator};

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub credentials: CredentialStore,
    pub tokens: Arc<TokenService>,
    pub pinning: Arc<dyn Pinning>,
    pub analyzer: Arc<dyn MetadataAnalyzer>,
    pub registry: Arc<dyn ReferenceRegistry>,
    pub staging: Arc<StagingArea>,
    pub uploads: Arc<UploadOrchestrator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire the upload orchestrator to the same collaborators the
    /// handlers use.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ServerConfig,
        credentials: CredentialStore,
        tokens: TokenService,
        pinning: Arc<dyn Pinning>,
        analyzer: Arc<dyn MetadataAnalyzer>,
        registry: Arc<dyn ReferenceRegistry>,
        staging: StagingArea,
    ) -> Self {
        let uploads = UploadOrchestrator::new(
            credentials.clone(),
            pinning.clone(),
            analyzer.clone(),
            registry.clone(),
            config.ipfs_gateway_url.clone(),
        );
        Self {
            credentials,
            tokens: Arc::new(tokens),
            pinning,
            analyzer,
            registry,
            staging: Arc::new(staging),
            uploads: Arc::new(uploads),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let body_limit = state.staging.max_size().saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/profile", get(auth::profile))
        .route("/api/auth/update-profile", put(auth::update_profile))
        .route("/api/protected-route", get(auth::protected_route))
        .route("/api/files", get(files::list_files))
        .route("/api/deleteFile", delete(files::delete_file))
        .route("/api/deleteAllFiles", delete(files::delete_all_files))
        .route("/api/getMetadata", get(files::get_metadata))
        .route("/api/upload", post(upload::upload))
        .route("/api/recommend", post(recommend))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn recommend(
    State(state): State<AppState>,
    Json(metadata): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let recommendations = state
        .analyzer
        .recommend(&metadata)
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch analysis", e))?;
    Ok(Json(recommendations))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
