//! Persistence for pickup points, receptions, products, and users.
//!
//! # Tables
//!
//! - `pvz` - Pickup points
//! - `reception` - Intake sessions; a partial unique index allows one
//!   `in_progress` row per pickup point
//! - `product` - Items logged against a reception, ordered by `seq`
//! - `users` - Staff accounts with Argon2id password hashes
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p pvz-cli -- migrate
//! ```
//!
//! Workflow code talks to the [`EntityStore`] and [`UserStore`] traits only.
//! [`postgres`] backs them with `PostgreSQL`; [`memory`] keeps the same
//! invariants in process for tests.

pub mod memory;
pub mod postgres;
pub mod users;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use pvz_core::{Email, PickupPointId, ProductId, ReceptionId, ReceptionStatus};

use crate::models::{
    ListFilter, PickupPoint, PickupPointWithReceptions, Product, Reception, ReceptionWithProducts,
};
use crate::models::{User, UserCredentials};

pub use memory::MemoryStore;
pub use postgres::PgEntityStore;
pub use users::PgUserStore;

/// Name of the partial unique index that allows one open reception per point.
pub const OPEN_RECEPTION_CONSTRAINT: &str = "reception_one_open_per_pvz";

/// Name of the unique constraint on user emails.
pub const USER_EMAIL_CONSTRAINT: &str = "users_email_key";

/// Name of the primary key constraint on pickup points.
pub const PVZ_PKEY_CONSTRAINT: &str = "pvz_pkey";

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// A uniqueness constraint rejected the write. Carries the constraint name.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether this is a violation of the named unique constraint.
    #[must_use]
    pub fn is_conflict_on(&self, constraint: &str) -> bool {
        matches!(self, Self::Conflict(name) if name == constraint)
    }
}

/// Map a unique violation to [`StoreError::Conflict`], keeping everything else as-is.
pub(crate) fn map_unique_violation(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let constraint = db_err.constraint().unwrap_or("unique").to_owned();
        return StoreError::Conflict(constraint);
    }
    StoreError::Database(e)
}

/// Durable storage for the intake graph.
///
/// Mutations go through a [`StoreTx`]; dropping the transaction without
/// calling [`StoreTx::commit`] discards every write made through it.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Begin a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Insert a pickup point in its own transaction.
    async fn insert_pickup_point(&self, pvz: &PickupPoint) -> Result<(), StoreError>;

    /// Return one page of pickup points with their in-window receptions and products.
    async fn query_pickup_points_with_receptions(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<PickupPointWithReceptions>, StoreError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// A single store transaction.
#[async_trait]
pub trait StoreTx: Send {
    async fn pickup_point_exists(&mut self, id: PickupPointId) -> Result<bool, StoreError>;

    /// Find the open reception for a point, locking it until the transaction ends.
    async fn find_open_reception(
        &mut self,
        pvz_id: PickupPointId,
    ) -> Result<Option<Reception>, StoreError>;

    /// Whether the point has any reception, open or closed.
    async fn has_any_reception(&mut self, pvz_id: PickupPointId) -> Result<bool, StoreError>;

    /// Insert a reception. A second open reception for the same point fails
    /// with `Conflict(OPEN_RECEPTION_CONSTRAINT)`.
    async fn insert_reception(&mut self, reception: &Reception) -> Result<(), StoreError>;

    async fn update_reception_status(
        &mut self,
        id: ReceptionId,
        status: ReceptionStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<Reception, StoreError>;

    /// Insert a product. The store assigns `seq` and returns the stored row.
    async fn insert_product(&mut self, product: &Product) -> Result<Product, StoreError>;

    /// The product with the highest `seq` in a reception.
    async fn find_last_product(
        &mut self,
        reception_id: ReceptionId,
    ) -> Result<Option<Product>, StoreError>;

    async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Storage for staff accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. A duplicate email fails with `Conflict(USER_EMAIL_CONSTRAINT)`.
    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<(), StoreError>;

    async fn find_user_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, StoreError>;
}

/// Nest ordered receptions and products under their owning points.
pub(crate) fn assemble(
    points: Vec<PickupPoint>,
    receptions: Vec<Reception>,
    products: Vec<Product>,
) -> Vec<PickupPointWithReceptions> {
    let mut products_by_reception: HashMap<ReceptionId, Vec<Product>> = HashMap::new();
    for product in products {
        products_by_reception
            .entry(product.reception_id)
            .or_default()
            .push(product);
    }

    let mut receptions_by_point: HashMap<PickupPointId, Vec<ReceptionWithProducts>> =
        HashMap::new();
    for reception in receptions {
        let products = products_by_reception
            .remove(&reception.id)
            .unwrap_or_default();
        receptions_by_point
            .entry(reception.pickup_point_id)
            .or_default()
            .push(ReceptionWithProducts {
                reception,
                products,
            });
    }

    points
        .into_iter()
        .map(|pvz| PickupPointWithReceptions {
            receptions: receptions_by_point.remove(&pvz.id).unwrap_or_default(),
            pvz,
        })
        .collect()
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_conflict_on_matches_constraint_name() {
        let err = StoreError::Conflict(OPEN_RECEPTION_CONSTRAINT.to_owned());
        assert!(err.is_conflict_on(OPEN_RECEPTION_CONSTRAINT));
        assert!(!err.is_conflict_on(USER_EMAIL_CONSTRAINT));
        assert!(!StoreError::DataCorruption("x".into()).is_conflict_on(OPEN_RECEPTION_CONSTRAINT));
    }
}
