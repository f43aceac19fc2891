//! Authentication error types.

use thiserror::Error;

use super::token::TokenError;
use crate::db::StoreError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] pvz_core::EmailError),

    /// Role is not one of the known roles.
    #[error("invalid role: {0}")]
    InvalidRole(#[from] pvz_core::UnknownVariant),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Token could not be signed.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Store error.
    #[error("database error: {0}")]
    Store(#[from] StoreError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
