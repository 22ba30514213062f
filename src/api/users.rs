//! User API endpoints.
//!
//! Anyone may register. Reading is limited to the signed-in user's own
//! account.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    db::{self, User},
    error::{Error, Result},
    middleware::AuthUser,
    services::Registration,
    AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub date_joined: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            date_joined: user.created_at,
        }
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user))
}

fn signed_in(user: Option<Extension<AuthUser>>) -> Result<AuthUser> {
    user.map(|Extension(u)| u).ok_or(Error::Unauthenticated)
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a new user.
///
/// POST /user
#[axum::debug_handler]
async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<Registration>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let user = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// List users visible to the caller, which is only themselves.
///
/// GET /user
#[axum::debug_handler]
async fn list_users(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
) -> Result<Json<Vec<UserResponse>>> {
    let auth = signed_in(user)?;
    let user = db::get_user(&state.db, auth.user_id).await?;
    Ok(Json(vec![user.into()]))
}

/// Get a user. Other users' accounts are reported as missing.
///
/// GET /user/:id
#[axum::debug_handler]
async fn get_user(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>> {
    let auth = signed_in(user)?;
    if id != auth.user_id {
        return Err(Error::NotFound(format!("User not found: {}", id)));
    }

    let user = db::get_user(&state.db, id).await?;
    Ok(Json(user.into()))
}
