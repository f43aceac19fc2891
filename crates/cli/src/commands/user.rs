//! Staff account commands.
//!
//! # Usage
//!
//! ```bash
//! pvz-cli user create -e moderator@pvz.example -p 'a long passphrase' -r moderator
//! ```

use chrono::Utc;
use thiserror::Error;

use pvz_core::{Email, EmailError, Role, UnknownVariant, UserId};
use pvz_service::db::{PgUserStore, StoreError, UserStore};
use pvz_service::models::User;
use pvz_service::services::auth::{AuthError, hash_password, validate_password};

use super::{CommandError, database_url};

/// Errors that can occur while creating an account.
#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Invalid role: {0}")]
    InvalidRole(#[from] UnknownVariant),

    #[error(transparent)]
    Password(#[from] AuthError),

    #[error("User already exists with email: {0}")]
    UserExists(String),

    #[error("Database error: {0}")]
    Store(StoreError),
}

/// Create a new staff account.
///
/// Input is validated before any connection is opened.
///
/// # Errors
///
/// Returns an error for invalid input, a duplicate email, or a database failure.
pub async fn create_user(email: &str, password: &str, role: &str) -> Result<UserId, UserError> {
    let email = Email::parse(email)?;
    let role: Role = role.parse()?;
    validate_password(password)?;
    let password_hash = hash_password(password)?;

    let database_url = database_url()?;
    tracing::info!("Connecting to database...");
    let pool = pvz_service::db::create_pool(&database_url)
        .await
        .map_err(CommandError::from)?;
    let users = PgUserStore::new(pool);

    let user = User {
        id: UserId::new_v4(),
        email,
        role,
        created_at: Utc::now(),
    };

    tracing::info!("Creating user: {} ({})", user.email, user.role);
    users
        .insert_user(&user, &password_hash)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => UserError::UserExists(user.email.to_string()),
            other => UserError::Store(other),
        })?;

    Ok(user.id)
}
