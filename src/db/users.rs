//! User database queries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{is_unique_violation, DbPool};
use crate::{Error, Result};

/// User record from the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
}

/// Create a new user. Usernames are unique.
pub async fn create_user(pool: &DbPool, input: CreateUser) -> Result<User> {
    if get_user_by_username(pool, &input.username).await?.is_some() {
        return Err(Error::AlreadyExists(format!("User {}", input.username)));
    }

    insert_user(pool, &input).await
}

/// Insert a user row. A concurrent insert of the same username surfaces
/// through the UNIQUE constraint.
async fn insert_user(pool: &DbPool, input: &CreateUser) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash, email, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.username)
    .bind(&input.password_hash)
    .bind(&input.email)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::AlreadyExists(format!("User {}", input.username))
        } else {
            Error::Database(e)
        }
    })
}

/// Get a user by ID.
pub async fn get_user(pool: &DbPool, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))
}

/// Look up a user by username.
pub async fn get_user_by_username(pool: &DbPool, username: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}
