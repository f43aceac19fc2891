//! Staff account models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pvz_core::{Email, Role, UserId};

/// A registered staff account. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub role: Role,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

/// A user together with the stored Argon2 PHC hash, as read for login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}
