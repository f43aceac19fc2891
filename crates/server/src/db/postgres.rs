//! `PostgreSQL` implementation of [`EntityStore`].
//!
//! Queries are built at runtime with `sqlx::query_as` and mapped through
//! internal row types, so the crate builds without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use pvz_core::{PickupPointId, ProductId, ReceptionId, ReceptionStatus};

use super::{EntityStore, StoreError, StoreTx, assemble, map_unique_violation};
use crate::models::{ListFilter, PickupPoint, PickupPointWithReceptions, Product, Reception};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct PickupPointRow {
    id: PickupPointId,
    registration_date: DateTime<Utc>,
    city: String,
}

impl TryFrom<PickupPointRow> for PickupPoint {
    type Error = StoreError;

    fn try_from(row: PickupPointRow) -> Result<Self, Self::Error> {
        let city = row.city.parse().map_err(|e| {
            StoreError::DataCorruption(format!("invalid city in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            registration_date: row.registration_date,
            city,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReceptionRow {
    id: ReceptionId,
    pvz_id: PickupPointId,
    opened_at: DateTime<Utc>,
    status: String,
    closed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReceptionRow> for Reception {
    type Error = StoreError;

    fn try_from(row: ReceptionRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e| {
            StoreError::DataCorruption(format!("invalid reception status in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            opened_at: row.opened_at,
            pickup_point_id: row.pvz_id,
            status,
            closed_at: row.closed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    seq: i64,
    reception_id: ReceptionId,
    product_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let product_type = row.product_type.parse().map_err(|e| {
            StoreError::DataCorruption(format!("invalid product type in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            created_at: row.created_at,
            product_type,
            reception_id: row.reception_id,
            seq: row.seq,
        })
    }
}

const RECEPTION_COLUMNS: &str = "id, pvz_id, opened_at, status, closed_at";
const PRODUCT_COLUMNS: &str = "id, seq, reception_id, product_type, created_at";

// =============================================================================
// Store
// =============================================================================

/// Entity store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn insert_pickup_point(&self, pvz: &PickupPoint) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO pvz (id, registration_date, city) VALUES ($1, $2, $3)")
            .bind(pvz.id)
            .bind(pvz.registration_date)
            .bind(pvz.city.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn query_pickup_points_with_receptions(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<PickupPointWithReceptions>, StoreError> {
        // One page of points, ordered by their earliest in-window reception.
        let points: Vec<PickupPoint> = sqlx::query_as::<_, PickupPointRow>(
            r"
            SELECT p.id, p.registration_date, p.city
            FROM pvz p
            LEFT JOIN LATERAL (
                SELECT MIN(r.opened_at) AS first_opened
                FROM reception r
                WHERE r.pvz_id = p.id
                  AND ($1::timestamptz IS NULL OR r.opened_at >= $1)
                  AND ($2::timestamptz IS NULL OR r.opened_at <= $2)
            ) w ON TRUE
            WHERE $3 OR w.first_opened IS NOT NULL
            ORDER BY w.first_opened ASC NULLS LAST, p.registration_date ASC, p.id ASC
            LIMIT $4 OFFSET $5
            ",
        )
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(!filter.is_windowed())
        .bind(i64::from(filter.limit))
        .bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<_, _>>()?;

        if points.is_empty() {
            return Ok(Vec::new());
        }

        let pvz_ids: Vec<Uuid> = points.iter().map(|p| p.id.as_uuid()).collect();
        let receptions: Vec<Reception> = sqlx::query_as::<_, ReceptionRow>(&format!(
            r"
            SELECT {RECEPTION_COLUMNS}
            FROM reception
            WHERE pvz_id = ANY($1)
              AND ($2::timestamptz IS NULL OR opened_at >= $2)
              AND ($3::timestamptz IS NULL OR opened_at <= $3)
            ORDER BY opened_at ASC, id ASC
            "
        ))
        .bind(pvz_ids.as_slice())
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<_, _>>()?;

        let reception_ids: Vec<Uuid> = receptions.iter().map(|r| r.id.as_uuid()).collect();
        let products: Vec<Product> = if reception_ids.is_empty() {
            Vec::new()
        } else {
            sqlx::query_as::<_, ProductRow>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM product WHERE reception_id = ANY($1) ORDER BY seq ASC"
            ))
            .bind(reception_ids.as_slice())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<_, _>>()?
        };

        Ok(assemble(points, receptions, products))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// An open `PostgreSQL` transaction. Rolled back on drop unless committed.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn pickup_point_exists(&mut self, id: PickupPointId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pvz WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn find_open_reception(
        &mut self,
        pvz_id: PickupPointId,
    ) -> Result<Option<Reception>, StoreError> {
        let row = sqlx::query_as::<_, ReceptionRow>(&format!(
            "SELECT {RECEPTION_COLUMNS} FROM reception
             WHERE pvz_id = $1 AND status = $2
             FOR UPDATE"
        ))
        .bind(pvz_id)
        .bind(ReceptionStatus::Open.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn has_any_reception(&mut self, pvz_id: PickupPointId) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM reception WHERE pvz_id = $1)")
                .bind(pvz_id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn insert_reception(&mut self, reception: &Reception) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reception (id, pvz_id, opened_at, status, closed_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(reception.id)
        .bind(reception.pickup_point_id)
        .bind(reception.opened_at)
        .bind(reception.status.as_str())
        .bind(reception.closed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn update_reception_status(
        &mut self,
        id: ReceptionId,
        status: ReceptionStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<Reception, StoreError> {
        let row = sqlx::query_as::<_, ReceptionRow>(&format!(
            "UPDATE reception SET status = $2, closed_at = $3
             WHERE id = $1
             RETURNING {RECEPTION_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(closed_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_unique_violation)?;

        row.try_into()
    }

    async fn insert_product(&mut self, product: &Product) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO product (id, reception_id, product_type, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(product.id)
        .bind(product.reception_id)
        .bind(product.product_type.as_str())
        .bind(product.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_unique_violation)?;

        row.try_into()
    }

    async fn find_last_product(
        &mut self,
        reception_id: ReceptionId,
    ) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product
             WHERE reception_id = $1
             ORDER BY seq DESC
             LIMIT 1
             FOR UPDATE"
        ))
        .bind(reception_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM product WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
