//! Middleware for the costume studio backend.
//!
//! Provides authentication middleware:
//! - `resolve_user` - optional JWT bearer authentication for every API route
//! - `require_user` - rejects anonymous callers on routes that need an account

mod jwt_auth;

pub use jwt_auth::{require_user, resolve_user, AuthUser};

use axum::Extension;

use crate::db::Owner;

/// Ownership scope of the caller, for queries that allow anonymous access.
pub fn owner_of(user: &Option<Extension<AuthUser>>) -> Owner {
    match user {
        Some(Extension(user)) => Owner::User(user.user_id),
        None => Owner::Anonymous,
    }
}
