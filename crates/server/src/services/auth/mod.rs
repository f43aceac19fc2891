//! Authentication service.
//!
//! Issues identity tokens for anonymous role logins, password logins, and
//! registrations. Every issuance returns an identity token plus an
//! anti-forgery token that the client must echo on cookie-authenticated
//! writes.

mod error;
pub mod token;

pub use error::AuthError;
pub use token::{IssuedToken, TokenCodec, TokenError};

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::RngCore;

use pvz_core::{Email, Role, UserId};

use crate::db::{StoreError, UserStore};
use crate::models::User;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Token pair handed to a client after a successful login.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub access_token: String,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenCodec,
    token_ttl: Duration,
}

impl AuthService {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenCodec, token_ttl: Duration) -> Self {
        Self {
            users,
            tokens,
            token_ttl,
        }
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Issue credentials for a role without checking any password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRole` if `role` is not a known role.
    pub fn dummy_login(&self, role: &str) -> Result<IssuedCredentials, AuthError> {
        let role: Role = role.parse()?;
        self.issue(role)
    }

    /// Register a new user with email, password, and role.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail`, `InvalidRole`, or `WeakPassword` for bad input.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<(User, IssuedCredentials), AuthError> {
        let email = Email::parse(email)?;
        let role: Role = role.parse()?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = User {
            id: UserId::new_v4(),
            email,
            role,
            created_at: Utc::now(),
        };

        self.users
            .insert_user(&user, &password_hash)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Store(other),
            })?;

        tracing::info!(user_id = %user.id, role = %user.role, "user registered");

        let credentials = self.issue(user.role)?;
        Ok((user, credentials))
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedCredentials, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let stored = self
            .users
            .find_user_credentials_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &stored.password_hash)?;

        self.issue(stored.user.role)
    }

    fn issue(&self, role: Role) -> Result<IssuedCredentials, AuthError> {
        let IssuedToken { token, expires_at } = self.tokens.issue(role, self.token_ttl)?;
        Ok(IssuedCredentials {
            access_token: token,
            csrf_token: generate_csrf_token(),
            expires_at,
        })
    }
}

/// Generate a random anti-forgery token (256-bit, URL-safe base64).
#[must_use]
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Validate password requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is too short.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
