//! Authentication service.
//!
//! Handles user registration, password verification and JWT issuance.
//! Two token kinds are issued: short-lived access tokens sent as
//! `Authorization: Bearer` headers, and long-lived refresh tokens that can
//! only be exchanged for a new access token.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::db::{self, CreateUser, DbPool, User};
use crate::{Error, Result};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

const MAX_USERNAME_LEN: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: i64,
    pub username: String,
    pub token_type: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

/// An access/refresh token pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Input for user registration.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    db: DbPool,
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(db: DbPool, config: &AuthConfig) -> Self {
        Self {
            db,
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: Duration::seconds(config.access_ttl_seconds),
            refresh_ttl: Duration::seconds(config.refresh_ttl_seconds),
        }
    }

    /// Hash a password with Argon2 and a random salt.
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)))
    }

    /// Check a password against a stored hash. Malformed hashes never match.
    pub fn verify_password(password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!("Stored password hash is malformed: {}", e);
                false
            }
        }
    }

    /// Register a new user.
    pub async fn register(&self, input: Registration) -> Result<User> {
        let username = input.username.trim();
        if username.is_empty() {
            return Err(Error::Validation("Username is required".into()));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(Error::Validation(format!(
                "Username must be at most {} characters",
                MAX_USERNAME_LEN
            )));
        }
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let email = input
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(Error::Validation("Enter a valid email address".into()));
            }
        }

        let password_hash = Self::hash_password(&input.password)?;
        let user = db::create_user(
            &self.db,
            CreateUser {
                username: username.to_string(),
                password_hash,
                email,
            },
        )
        .await?;

        info!(user_id = user.id, username = %user.username, "Registered user");
        Ok(user)
    }

    /// Look up a user by username and check their password.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let user = db::get_user_by_username(&self.db, username)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if !Self::verify_password(password, &user.password_hash) {
            return Err(Error::InvalidCredentials);
        }

        Ok(user)
    }

    /// Sign a token of the given kind for a user.
    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<String> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user.id.to_string(),
            user_id: user.id,
            username: user.username.clone(),
            token_type: kind,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        Ok(jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Issue an access/refresh pair.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair> {
        Ok(TokenPair {
            access: self.issue(user, TokenKind::Access)?,
            refresh: self.issue(user, TokenKind::Refresh)?,
        })
    }

    /// Verify a token's signature, expiry and kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())?;
        if data.claims.token_type != kind {
            return Err(Error::InvalidToken);
        }
        Ok(data.claims)
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The user must still exist.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        let user = db::get_user(&self.db, claims.user_id)
            .await
            .map_err(|_| Error::InvalidToken)?;
        self.issue(&user, TokenKind::Access)
    }
}
