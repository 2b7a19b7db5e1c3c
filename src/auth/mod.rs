use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::models::User;
use crate::store::{Store, StoreError};

mod middleware;

pub use middleware::RequireAuth;

/// bcrypt work factor for stored passwords
pub const HASH_COST: u32 = 10;

/// bcrypt only looks at this many bytes of a password
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Default token lifetime
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;

/// Longest token lifetime the server accepts
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown user, wrong password, or a bad or stale token. Callers
    /// cannot tell these apart.
    #[error("Invalid credentials")]
    Unauthenticated,
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("Token lifetime out of range")]
    TokenLifetime,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // user id
    pub exp: i64,         // expiration timestamp
    pub iat: i64,         // issued at
}

/// Hash a password using bcrypt
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, HASH_COST)
}

/// Verify a password against a bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(password, hash)
}

pub struct AuthService {
    jwt_secret: String,
    token_ttl: Duration,
    store: Arc<Store>,
}

impl AuthService {
    pub fn new(jwt_secret: String, store: Arc<Store>) -> Self {
        Self {
            jwt_secret,
            token_ttl: Duration::days(DEFAULT_TOKEN_TTL_DAYS),
            store,
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Check a username/password pair and return the matching user
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthError> {
        match self.store.get_user_by_username(username)? {
            Some(user) if user.check_password(password) => Ok(user),
            _ => {
                log::warn!("Failed login attempt for {}", username);
                Err(AuthError::Unauthenticated)
            }
        }
    }

    /// Generate a JWT token for a user
    pub fn generate_token(&self, user_id: i64) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(self.token_ttl)
            .ok_or(AuthError::TokenLifetime)?;

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Validate a JWT token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Resolve a token to the user it was issued for. Tokens of deleted
    /// users no longer identify anyone.
    pub fn identify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self
            .validate_token(token)
            .map_err(|_| AuthError::Unauthenticated)?;
        let id: i64 = claims.sub.parse().map_err(|_| AuthError::Unauthenticated)?;

        let user = self.store.get_user(id)?.ok_or(AuthError::Unauthenticated)?;
        Ok(AuthUser {
            id,
            username: user.username,
        })
    }
}

/// Authenticated user info injected into requests by [`RequireAuth`]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}
