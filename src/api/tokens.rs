//! Token Routes
//!
//! Routes:
//! - POST /token/obtain - Single access token plus the user's id and name
//! - POST /token - Access/refresh token pair
//! - POST /token/refresh - New access token from a refresh token

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::services::{TokenKind, TokenPair};
use crate::{AppState, Result};

/// Build token routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(obtain_pair))
        .route("/obtain", post(obtain_token))
        .route("/refresh", post(refresh))
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ObtainTokenResponse {
    pub id: i64,
    pub token: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// POST /token/obtain
#[axum::debug_handler]
async fn obtain_token(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<ObtainTokenResponse>> {
    let user = state
        .auth
        .authenticate(&credentials.username, &credentials.password)
        .await?;
    let token = state.auth.issue(&user, TokenKind::Access)?;

    info!(user_id = user.id, "Issued token");
    Ok(Json(ObtainTokenResponse {
        id: user.id,
        token,
        username: user.username,
    }))
}

/// POST /token
#[axum::debug_handler]
async fn obtain_pair(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<TokenPair>> {
    let user = state
        .auth
        .authenticate(&credentials.username, &credentials.password)
        .await?;

    info!(user_id = user.id, "Issued token pair");
    Ok(Json(state.auth.issue_pair(&user)?))
}

/// POST /token/refresh
#[axum::debug_handler]
async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>> {
    let access = state.auth.refresh(&request.refresh).await?;
    Ok(Json(RefreshResponse { access }))
}
