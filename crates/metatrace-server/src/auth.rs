//! Account endpoints and bearer-token authentication.

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::{async_trait, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use metatrace_shared::{SessionClaims, SessionError};
use metatrace_store::User;

use crate::api::AppState;
use crate::credentials::ProfileChange;
use crate::error::ApiError;

/// Claims of a verified `Authorization: Bearer` token.
#[derive(Debug, Clone)]
pub struct AuthSession(pub SessionClaims);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Unauthorized: No token provided".into()))?;

        match state.tokens.verify(token) {
            Ok(claims) => Ok(AuthSession(claims)),
            Err(e) => {
                match &e {
                    SessionError::Expired => debug!("Rejected expired session token"),
                    SessionError::Invalid => debug!("Rejected invalid session token"),
                    SessionError::Encoding(detail) => debug!(%detail, "Session token error"),
                }
                Err(e.into())
            }
        }
    }
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Signup / login
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Serialize)]
pub struct SignupResponse {
    message: &'static str,
    token: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let (Some(name), Some(email), Some(_)) = (
        required(&req.name),
        required(&req.email),
        required(&req.password),
    ) else {
        return Err(ApiError::BadRequest("All fields are required".into()));
    };
    let password = req.password.as_deref().unwrap_or_default();

    let user = state.credentials.create_user(name, email, password).await?;
    let session = state.tokens.issue(user.id, &user.email)?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User registered successfully",
            token: session.token,
        }),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    message: &'static str,
    user_id: String,
    token: String,
    /// Epoch milliseconds; clients log out proactively once it passes.
    expiry: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (Some(email), Some(_)) = (required(&req.email), required(&req.password)) else {
        return Err(ApiError::BadRequest("Email and password are required.".into()));
    };
    let password = req.password.as_deref().unwrap_or_default();

    let user = state.credentials.authenticate(email, password).await?;
    let session = state.tokens.issue(user.id, &user.email)?;
    info!(user_id = %user.id, "Login successful");

    Ok(Json(LoginResponse {
        message: "Login successful",
        user_id: user.id.to_string(),
        token: session.token,
        expiry: session.expiry_epoch_ms,
    }))
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileResponse {
    pub name: String,
    pub email: String,
}

pub async fn profile(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state.credentials.find_user(claims.user_id)?;
    Ok(Json(ProfileResponse {
        name: user.name,
        email: user.email,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    current_password: Option<String>,
    #[serde(default)]
    new_password: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (Some(name), Some(email)) = (required(&req.name), required(&req.email)) else {
        return Err(ApiError::BadRequest("Name and email are required".into()));
    };

    let change = ProfileChange {
        name: name.to_string(),
        email: email.to_string(),
        current_password: req.current_password,
        new_password: req.new_password,
    };
    state.credentials.update_profile(claims.user_id, &change).await?;

    Ok(Json(serde_json::json!({ "message": "Profile updated successfully" })))
}

/// Returns the caller's account. Every token failure is a plain 401 here.
pub async fn protected_route(
    State(state): State<AppState>,
    session: Result<AuthSession, ApiError>,
) -> Result<Json<User>, ApiError> {
    let AuthSession(claims) =
        session.map_err(|_| ApiError::Unauthorized("Unauthorized".into()))?;
    let user = state.credentials.find_user(claims.user_id)?;
    Ok(Json(user))
}
