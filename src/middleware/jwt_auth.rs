//! JWT bearer authentication middleware.
//!
//! Access tokens are read from `Authorization: Bearer {token}`. A request
//! without the header is anonymous; a request with a bad or expired token is
//! rejected rather than silently treated as anonymous.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::services::TokenKind;
use crate::{error::Error, AppState};

/// Signed-in user injected into request extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
}

/// Extract the bearer token, if any.
///
/// A header with another scheme counts as a malformed token.
fn bearer_token(req: &Request<Body>) -> Result<Option<&str>, Error> {
    let Some(header) = req.headers().get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = header.to_str().map_err(|_| Error::InvalidToken)?;
    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or(Error::InvalidToken)
}

/// Middleware that identifies the caller when a token is present.
///
/// Injects `AuthUser` on success and leaves anonymous requests untouched.
///
/// # Errors
///
/// Returns 401 Unauthorized if a token is present but invalid, expired, or
/// a refresh token.
pub async fn resolve_user(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let user = match bearer_token(&req)? {
        Some(token) => {
            let claims = state.auth.verify(token, TokenKind::Access)?;
            Some(AuthUser {
                user_id: claims.user_id,
                username: claims.username,
            })
        }
        None => None,
    };

    if let Some(user) = user {
        tracing::debug!(user_id = user.user_id, "Authenticated request");
        req.extensions_mut().insert(user);
    }

    Ok(next.run(req).await)
}

/// Middleware that requires a signed-in caller.
///
/// Must run after [`resolve_user`].
///
/// # Errors
///
/// Returns 401 Unauthorized for anonymous requests.
pub async fn require_user(req: Request<Body>, next: Next) -> Result<Response, Error> {
    if req.extensions().get::<AuthUser>().is_none() {
        return Err(Error::Unauthenticated);
    }
    Ok(next.run(req).await)
}
