//! In-process store with the same invariants as the `PostgreSQL` schema.
//!
//! Transactions are fully serialised: `begin` takes an owned lock on the
//! whole state and works on a copy, `commit` writes the copy back, and
//! dropping the transaction throws it away.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use pvz_core::{Email, PickupPointId, ProductId, ReceptionId, ReceptionStatus};

use super::{
    EntityStore, OPEN_RECEPTION_CONSTRAINT, PVZ_PKEY_CONSTRAINT, StoreError, StoreTx,
    USER_EMAIL_CONSTRAINT, UserStore, assemble,
};
use crate::models::{
    ListFilter, PickupPoint, PickupPointWithReceptions, Product, Reception, User, UserCredentials,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    points: Vec<PickupPoint>,
    receptions: Vec<Reception>,
    products: Vec<Product>,
    users: HashMap<Email, UserCredentials>,
    next_seq: i64,
}

impl MemoryState {
    fn open_reception(&self, pvz_id: PickupPointId) -> Option<&Reception> {
        self.receptions
            .iter()
            .find(|r| r.pickup_point_id == pvz_id && r.is_open())
    }
}

/// In-memory [`EntityStore`] and [`UserStore`].
///
/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Number of stored products in a reception.
    pub async fn product_count(&self, reception_id: ReceptionId) -> usize {
        self.state
            .lock()
            .await
            .products
            .iter()
            .filter(|p| p.reception_id == reception_id)
            .count()
    }

    /// All receptions for a point, oldest first.
    pub async fn receptions_for(&self, pvz_id: PickupPointId) -> Vec<Reception> {
        self.state
            .lock()
            .await
            .receptions
            .iter()
            .filter(|r| r.pickup_point_id == pvz_id)
            .cloned()
            .collect()
    }
}

/// Earliest-first with points lacking an in-window reception sorted last.
fn by_first_opened(
    a: (Option<DateTime<Utc>>, &PickupPoint),
    b: (Option<DateTime<Utc>>, &PickupPoint),
) -> Ordering {
    let first = match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    first
        .then_with(|| a.1.registration_date.cmp(&b.1.registration_date))
        .then_with(|| a.1.id.cmp(&b.1.id))
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        self.check_available()?;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn insert_pickup_point(&self, pvz: &PickupPoint) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.points.iter().any(|p| p.id == pvz.id) {
            return Err(StoreError::Conflict(PVZ_PKEY_CONSTRAINT.to_owned()));
        }
        state.points.push(pvz.clone());
        Ok(())
    }

    async fn query_pickup_points_with_receptions(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<PickupPointWithReceptions>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;

        let mut ranked: Vec<(Option<DateTime<Utc>>, &PickupPoint)> = state
            .points
            .iter()
            .map(|pvz| {
                let first_opened = state
                    .receptions
                    .iter()
                    .filter(|r| r.pickup_point_id == pvz.id && filter.contains(r.opened_at))
                    .map(|r| r.opened_at)
                    .min();
                (first_opened, pvz)
            })
            .filter(|(first_opened, _)| !filter.is_windowed() || first_opened.is_some())
            .collect();
        ranked.sort_by(|a, b| by_first_opened(*a, *b));

        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.limit).unwrap_or(usize::MAX);
        let points: Vec<PickupPoint> = ranked
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, pvz)| pvz.clone())
            .collect();

        let mut receptions: Vec<Reception> = state
            .receptions
            .iter()
            .filter(|r| {
                points.iter().any(|p| p.id == r.pickup_point_id) && filter.contains(r.opened_at)
            })
            .cloned()
            .collect();
        receptions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then(a.id.cmp(&b.id)));

        let mut products: Vec<Product> = state
            .products
            .iter()
            .filter(|p| receptions.iter().any(|r| r.id == p.reception_id))
            .cloned()
            .collect();
        products.sort_by_key(|p| p.seq);

        Ok(assemble(points, receptions, products))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.users.contains_key(&user.email) {
            return Err(StoreError::Conflict(USER_EMAIL_CONSTRAINT.to_owned()));
        }
        state.users.insert(
            user.email.clone(),
            UserCredentials {
                user: user.clone(),
                password_hash: password_hash.to_owned(),
            },
        );
        Ok(())
    }

    async fn find_user_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.users.get(email).cloned())
    }
}

/// A serialised in-memory transaction.
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn pickup_point_exists(&mut self, id: PickupPointId) -> Result<bool, StoreError> {
        Ok(self.working.points.iter().any(|p| p.id == id))
    }

    async fn find_open_reception(
        &mut self,
        pvz_id: PickupPointId,
    ) -> Result<Option<Reception>, StoreError> {
        Ok(self.working.open_reception(pvz_id).cloned())
    }

    async fn has_any_reception(&mut self, pvz_id: PickupPointId) -> Result<bool, StoreError> {
        Ok(self
            .working
            .receptions
            .iter()
            .any(|r| r.pickup_point_id == pvz_id))
    }

    async fn insert_reception(&mut self, reception: &Reception) -> Result<(), StoreError> {
        if reception.is_open()
            && self
                .working
                .open_reception(reception.pickup_point_id)
                .is_some()
        {
            return Err(StoreError::Conflict(OPEN_RECEPTION_CONSTRAINT.to_owned()));
        }
        self.working.receptions.push(reception.clone());
        Ok(())
    }

    async fn update_reception_status(
        &mut self,
        id: ReceptionId,
        status: ReceptionStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<Reception, StoreError> {
        let reception = self
            .working
            .receptions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        reception.status = status;
        reception.closed_at = closed_at;
        Ok(reception.clone())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<Product, StoreError> {
        self.working.next_seq += 1;
        let stored = Product {
            seq: self.working.next_seq,
            ..product.clone()
        };
        self.working.products.push(stored.clone());
        Ok(stored)
    }

    async fn find_last_product(
        &mut self,
        reception_id: ReceptionId,
    ) -> Result<Option<Product>, StoreError> {
        Ok(self
            .working
            .products
            .iter()
            .filter(|p| p.reception_id == reception_id)
            .max_by_key(|p| p.seq)
            .cloned())
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError> {
        self.working.products.retain(|p| p.id != id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
