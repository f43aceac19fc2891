//! Pickup point intake workflow.
//!
//! Each pickup point runs a sequence of receptions. A reception starts
//! `Open`, accepts products, gives them back in LIFO order on request, and
//! ends `Closed`; a closed reception never reopens.
//!
//! Every mutating operation runs inside one store transaction. Errors are
//! reported to the audit log before being returned.

mod error;

pub use error::{ConflictKind, IntakeError};

use std::sync::Arc;

use chrono::{DateTime, Utc};

use pvz_core::{City, PickupPointId, ProductId, ProductType, ReceptionStatus};

use crate::context::RequestContext;
use crate::db::{EntityStore, OPEN_RECEPTION_CONSTRAINT, StoreError, StoreTx};
use crate::models::{ListFilter, PickupPoint, PickupPointWithReceptions, Product, Reception};
use crate::services::audit::AuditLogger;
use crate::services::metrics::{EntityKind, MetricsSink};

/// Message returned when an operation names a pickup point that does not exist.
pub const PICKUP_POINT_NOT_FOUND: &str = "pickup point not found";

/// The intake state machine over an [`EntityStore`].
#[derive(Clone)]
pub struct IntakeWorkflow {
    store: Arc<dyn EntityStore>,
    metrics: Arc<dyn MetricsSink>,
    audit: Arc<dyn AuditLogger>,
}

impl IntakeWorkflow {
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        metrics: Arc<dyn MetricsSink>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            store,
            metrics,
            audit,
        }
    }

    /// Build a listing filter from raw query values.
    ///
    /// `page` defaults to 1 and must be at least 1. `limit` defaults to 10
    /// and is clamped to `1..=30`.
    ///
    /// # Errors
    ///
    /// Returns `IntakeError::Validation` if `page` is below 1 or if
    /// `start_date` is after `end_date`.
    pub fn list_filter(
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<ListFilter, IntakeError> {
        let page = page.unwrap_or(i64::from(ListFilter::DEFAULT_PAGE));
        if page < 1 {
            return Err(IntakeError::validation("page must be at least 1"));
        }
        let page = u32::try_from(page).map_err(|_| IntakeError::validation("page is too large"))?;

        let limit = limit
            .unwrap_or(i64::from(ListFilter::DEFAULT_LIMIT))
            .clamp(1, i64::from(ListFilter::MAX_LIMIT));
        let limit = u32::try_from(limit).unwrap_or(ListFilter::MAX_LIMIT);

        if let (Some(start), Some(end)) = (start_date, end_date)
            && start > end
        {
            return Err(IntakeError::validation(
                "startDate must not be after endDate",
            ));
        }

        Ok(ListFilter {
            start_date,
            end_date,
            page,
            limit,
        })
    }

    /// Register a new pickup point.
    ///
    /// # Errors
    ///
    /// Returns `IntakeError::Validation` for an unknown city or a duplicate id.
    pub async fn create_pvz(
        &self,
        ctx: &RequestContext,
        city: &str,
        id: Option<PickupPointId>,
        registration_date: Option<DateTime<Utc>>,
    ) -> Result<PickupPoint, IntakeError> {
        let result = self.create_pvz_inner(city, id, registration_date).await;
        self.observe(ctx, "create_pvz", result)
    }

    async fn create_pvz_inner(
        &self,
        city: &str,
        id: Option<PickupPointId>,
        registration_date: Option<DateTime<Utc>>,
    ) -> Result<PickupPoint, IntakeError> {
        let city: City = city
            .parse()
            .map_err(|e: pvz_core::UnknownVariant| IntakeError::validation(e.to_string()))?;

        let pvz = PickupPoint {
            id: id.unwrap_or_else(PickupPointId::new_v4),
            registration_date: registration_date.unwrap_or_else(Utc::now),
            city,
        };

        self.store
            .insert_pickup_point(&pvz)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => IntakeError::validation("pickup point already exists"),
                other => IntakeError::Storage(other),
            })?;

        self.metrics.entity_created(EntityKind::PickupPoint);
        tracing::info!(pvz_id = %pvz.id, city = %pvz.city, "pickup point created");
        Ok(pvz)
    }

    /// Open a new reception at a pickup point.
    ///
    /// # Errors
    ///
    /// Returns `Conflict(AlreadyOpen)` if a reception is already open there,
    /// including when a concurrent request wins the race.
    pub async fn open_reception(
        &self,
        ctx: &RequestContext,
        pvz_id: PickupPointId,
    ) -> Result<Reception, IntakeError> {
        let result = self.open_reception_inner(pvz_id).await;
        self.observe(ctx, "open_reception", result)
    }

    async fn open_reception_inner(&self, pvz_id: PickupPointId) -> Result<Reception, IntakeError> {
        let mut tx = self.begin_for(pvz_id).await?;

        if tx.find_open_reception(pvz_id).await?.is_some() {
            return Err(ConflictKind::AlreadyOpen.into());
        }

        let reception = Reception::open(pvz_id, Utc::now());
        tx.insert_reception(&reception).await.map_err(|e| {
            if e.is_conflict_on(OPEN_RECEPTION_CONSTRAINT) {
                IntakeError::Conflict(ConflictKind::AlreadyOpen)
            } else {
                IntakeError::Storage(e)
            }
        })?;
        tx.commit().await?;

        self.metrics.entity_created(EntityKind::Reception);
        tracing::info!(pvz_id = %pvz_id, reception_id = %reception.id, "reception opened");
        Ok(reception)
    }

    /// Log a product against the open reception of a pickup point.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an unknown product type and
    /// `Conflict(NoActiveReception)` when nothing is open.
    pub async fn add_product(
        &self,
        ctx: &RequestContext,
        pvz_id: PickupPointId,
        product_type: &str,
    ) -> Result<Product, IntakeError> {
        let result = self.add_product_inner(pvz_id, product_type).await;
        self.observe(ctx, "add_product", result)
    }

    async fn add_product_inner(
        &self,
        pvz_id: PickupPointId,
        product_type: &str,
    ) -> Result<Product, IntakeError> {
        let product_type: ProductType = product_type
            .parse()
            .map_err(|e: pvz_core::UnknownVariant| IntakeError::validation(e.to_string()))?;

        let mut tx = self.begin_for(pvz_id).await?;
        let reception = tx
            .find_open_reception(pvz_id)
            .await?
            .ok_or(ConflictKind::NoActiveReception)?;

        let product = tx
            .insert_product(&Product {
                id: ProductId::new_v4(),
                created_at: Utc::now(),
                product_type,
                reception_id: reception.id,
                seq: 0,
            })
            .await?;
        tx.commit().await?;

        self.metrics.entity_created(EntityKind::Product);
        tracing::debug!(
            reception_id = %reception.id,
            product_id = %product.id,
            product_type = %product.product_type,
            "product added"
        );
        Ok(product)
    }

    /// Remove the most recently added product of the open reception.
    ///
    /// # Errors
    ///
    /// Returns `Conflict(NoActiveReception)` when nothing is open and
    /// `Conflict(Empty)` when the open reception has no products.
    pub async fn remove_last_product(
        &self,
        ctx: &RequestContext,
        pvz_id: PickupPointId,
    ) -> Result<Product, IntakeError> {
        let result = self.remove_last_product_inner(pvz_id).await;
        self.observe(ctx, "remove_last_product", result)
    }

    async fn remove_last_product_inner(&self, pvz_id: PickupPointId) -> Result<Product, IntakeError> {
        let mut tx = self.begin_for(pvz_id).await?;
        let reception = tx
            .find_open_reception(pvz_id)
            .await?
            .ok_or(ConflictKind::NoActiveReception)?;

        let last = tx
            .find_last_product(reception.id)
            .await?
            .ok_or(ConflictKind::Empty)?;
        tx.delete_product(last.id).await?;
        tx.commit().await?;

        tracing::debug!(reception_id = %reception.id, product_id = %last.id, "product removed");
        Ok(last)
    }

    /// Close the open reception of a pickup point.
    ///
    /// # Errors
    ///
    /// Returns `Conflict(AlreadyClosed)` when the point has receptions but
    /// none is open, and `Conflict(NoActiveReception)` when it has none.
    pub async fn close_reception(
        &self,
        ctx: &RequestContext,
        pvz_id: PickupPointId,
    ) -> Result<Reception, IntakeError> {
        let result = self.close_reception_inner(pvz_id).await;
        self.observe(ctx, "close_reception", result)
    }

    async fn close_reception_inner(&self, pvz_id: PickupPointId) -> Result<Reception, IntakeError> {
        let mut tx = self.begin_for(pvz_id).await?;

        let Some(open) = tx.find_open_reception(pvz_id).await? else {
            let kind = if tx.has_any_reception(pvz_id).await? {
                ConflictKind::AlreadyClosed
            } else {
                ConflictKind::NoActiveReception
            };
            return Err(kind.into());
        };

        let closed = tx
            .update_reception_status(open.id, ReceptionStatus::Closed, Some(Utc::now()))
            .await?;
        tx.commit().await?;

        tracing::info!(pvz_id = %pvz_id, reception_id = %closed.id, "reception closed");
        Ok(closed)
    }

    /// List pickup points with their receptions and products.
    ///
    /// # Errors
    ///
    /// Returns `IntakeError::Storage` if the store fails.
    pub async fn list_pickup_points(
        &self,
        ctx: &RequestContext,
        filter: &ListFilter,
    ) -> Result<Vec<PickupPointWithReceptions>, IntakeError> {
        let result = self
            .store
            .query_pickup_points_with_receptions(filter)
            .await
            .map_err(IntakeError::from);
        self.observe(ctx, "list_pickup_points", result)
    }

    /// Begin a transaction and check that the pickup point exists.
    async fn begin_for(&self, pvz_id: PickupPointId) -> Result<Box<dyn StoreTx>, IntakeError> {
        let mut tx = self.store.begin().await?;
        if !tx.pickup_point_exists(pvz_id).await? {
            return Err(IntakeError::validation(PICKUP_POINT_NOT_FOUND));
        }
        Ok(tx)
    }

    fn observe<T>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        result: Result<T, IntakeError>,
    ) -> Result<T, IntakeError> {
        if let Err(err) = &result {
            self.audit.workflow_error(ctx, operation, &err.to_string());
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::MemoryStore;
    use crate::services::audit::testing::{Record, RecordingAuditLogger};
    use crate::services::metrics::NoopMetrics;

    struct Harness {
        store: MemoryStore,
        audit: Arc<RecordingAuditLogger>,
        workflow: IntakeWorkflow,
        ctx: RequestContext,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let audit = Arc::new(RecordingAuditLogger::default());
        let workflow = IntakeWorkflow::new(
            Arc::new(store.clone()),
            Arc::new(NoopMetrics),
            audit.clone(),
        );
        Harness {
            store,
            audit,
            workflow,
            ctx: RequestContext::new("test-request"),
        }
    }

    impl Harness {
        async fn pvz(&self) -> PickupPointId {
            self.workflow
                .create_pvz(&self.ctx, "Казань", None, None)
                .await
                .unwrap()
                .id
        }
    }

    fn assert_conflict<T: std::fmt::Debug>(result: Result<T, IntakeError>, kind: ConflictKind) {
        match result {
            Err(IntakeError::Conflict(actual)) => assert_eq!(actual, kind),
            other => panic!("expected {kind:?}, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_pvz_validates_city() {
        let h = harness();
        let err = h
            .workflow
            .create_pvz(&h.ctx, "Новосибирск", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation(_)));

        let id = PickupPointId::new_v4();
        let registered = Utc::now() - Duration::days(3);
        let pvz = h
            .workflow
            .create_pvz(&h.ctx, "Москва", Some(id), Some(registered))
            .await
            .unwrap();
        assert_eq!(pvz.id, id);
        assert_eq!(pvz.registration_date, registered);
        assert_eq!(pvz.city, City::Moscow);

        let duplicate = h.workflow.create_pvz(&h.ctx, "Москва", Some(id), None).await;
        assert!(matches!(duplicate, Err(IntakeError::Validation(_))));
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let h = harness();
        let pvz = h.pvz().await;

        let reception = h.workflow.open_reception(&h.ctx, pvz).await.unwrap();
        assert_eq!(reception.status, ReceptionStatus::Open);
        assert_conflict(
            h.workflow.open_reception(&h.ctx, pvz).await,
            ConflictKind::AlreadyOpen,
        );
    }

    #[tokio::test]
    async fn test_concurrent_opens_leave_one_open_reception() {
        let h = harness();
        let pvz = h.pvz().await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let workflow = h.workflow.clone();
            handles.push(tokio::spawn(async move {
                let ctx = RequestContext::new(format!("req-{i}"));
                workflow.open_reception(&ctx, pvz).await
            }));
        }

        let mut opened = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => opened += 1,
                Err(e) => assert!(matches!(
                    e,
                    IntakeError::Conflict(ConflictKind::AlreadyOpen)
                )),
            }
        }

        assert_eq!(opened, 1);
        let open_count = h
            .store
            .receptions_for(pvz)
            .await
            .iter()
            .filter(|r| r.is_open())
            .count();
        assert_eq!(open_count, 1);
    }

    #[tokio::test]
    async fn test_add_product_without_open_reception_writes_nothing() {
        let h = harness();
        let pvz = h.pvz().await;

        assert_conflict(
            h.workflow.add_product(&h.ctx, pvz, "обувь").await,
            ConflictKind::NoActiveReception,
        );
        assert!(h.store.receptions_for(pvz).await.is_empty());
    }

    #[tokio::test]
    async fn test_add_product_validates_type_first() {
        let h = harness();
        let err = h
            .workflow
            .add_product(&h.ctx, PickupPointId::new_v4(), "мебель")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation(msg) if msg.contains("product type")));
    }

    #[tokio::test]
    async fn test_unknown_pickup_point() {
        let h = harness();
        let err = h
            .workflow
            .open_reception(&h.ctx, PickupPointId::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation(msg) if msg == PICKUP_POINT_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_remove_last_product_is_lifo() {
        let h = harness();
        let pvz = h.pvz().await;
        let reception = h.workflow.open_reception(&h.ctx, pvz).await.unwrap();

        let a = h.workflow.add_product(&h.ctx, pvz, "электроника").await.unwrap();
        let b = h.workflow.add_product(&h.ctx, pvz, "одежда").await.unwrap();
        let c = h.workflow.add_product(&h.ctx, pvz, "обувь").await.unwrap();

        let removed = h.workflow.remove_last_product(&h.ctx, pvz).await.unwrap();
        assert_eq!(removed.id, c.id);
        let removed = h.workflow.remove_last_product(&h.ctx, pvz).await.unwrap();
        assert_eq!(removed.id, b.id);

        assert_eq!(h.store.product_count(reception.id).await, 1);
        let filter = IntakeWorkflow::list_filter(None, None, None, None).unwrap();
        let listing = h.workflow.list_pickup_points(&h.ctx, &filter).await.unwrap();
        assert_eq!(listing[0].receptions[0].products[0].id, a.id);
    }

    #[tokio::test]
    async fn test_remove_from_empty_reception() {
        let h = harness();
        let pvz = h.pvz().await;

        assert_conflict(
            h.workflow.remove_last_product(&h.ctx, pvz).await,
            ConflictKind::NoActiveReception,
        );
        h.workflow.open_reception(&h.ctx, pvz).await.unwrap();
        assert_conflict(
            h.workflow.remove_last_product(&h.ctx, pvz).await,
            ConflictKind::Empty,
        );
    }

    #[tokio::test]
    async fn test_close_twice() {
        let h = harness();
        let pvz = h.pvz().await;

        assert_conflict(
            h.workflow.close_reception(&h.ctx, pvz).await,
            ConflictKind::NoActiveReception,
        );

        h.workflow.open_reception(&h.ctx, pvz).await.unwrap();
        let closed = h.workflow.close_reception(&h.ctx, pvz).await.unwrap();
        assert_eq!(closed.status, ReceptionStatus::Closed);
        let closed_at = closed.closed_at.unwrap();

        assert_conflict(
            h.workflow.close_reception(&h.ctx, pvz).await,
            ConflictKind::AlreadyClosed,
        );
        let stored = h.store.receptions_for(pvz).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].closed_at, Some(closed_at));

        assert_conflict(
            h.workflow.add_product(&h.ctx, pvz, "обувь").await,
            ConflictKind::NoActiveReception,
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_closes_succeed_once() {
        let h = harness();
        let pvz = h.pvz().await;
        h.workflow.open_reception(&h.ctx, pvz).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let workflow = h.workflow.clone();
                tokio::spawn(async move {
                    let ctx = RequestContext::new(format!("close-{i}"));
                    workflow.close_reception(&ctx, pvz).await
                })
            })
            .collect();

        let mut closed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(reception) => {
                    assert_eq!(reception.status, ReceptionStatus::Closed);
                    closed += 1;
                }
                Err(e) => assert!(matches!(
                    e,
                    IntakeError::Conflict(ConflictKind::AlreadyClosed)
                )),
            }
        }

        assert_eq!(closed, 1);
        let stored = h.store.receptions_for(pvz).await;
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].is_open());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_removes_take_one_product() {
        let h = harness();
        let pvz = h.pvz().await;
        let reception = h.workflow.open_reception(&h.ctx, pvz).await.unwrap();
        let only = h.workflow.add_product(&h.ctx, pvz, "одежда").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let workflow = h.workflow.clone();
                tokio::spawn(async move {
                    let ctx = RequestContext::new(format!("remove-{i}"));
                    workflow.remove_last_product(&ctx, pvz).await
                })
            })
            .collect();

        let mut removed = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(product) => removed.push(product.id),
                Err(e) => assert!(matches!(e, IntakeError::Conflict(ConflictKind::Empty))),
            }
        }

        assert_eq!(removed, vec![only.id]);
        assert_eq!(h.store.product_count(reception.id).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_opens_and_closes_keep_one_open() {
        let h = harness();
        let pvz = h.pvz().await;

        let handles: Vec<_> = (0..24)
            .map(|i| {
                let workflow = h.workflow.clone();
                tokio::spawn(async move {
                    let ctx = RequestContext::new(format!("mixed-{i}"));
                    if i % 2 == 0 {
                        workflow.open_reception(&ctx, pvz).await.map(|_| true)
                    } else {
                        workflow.close_reception(&ctx, pvz).await.map(|_| false)
                    }
                })
            })
            .collect();

        let (mut opened, mut closed) = (0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Ok(true) => opened += 1,
                Ok(false) => closed += 1,
                Err(e) => assert!(matches!(
                    e,
                    IntakeError::Conflict(
                        ConflictKind::AlreadyOpen
                            | ConflictKind::AlreadyClosed
                            | ConflictKind::NoActiveReception
                    )
                )),
            }
        }

        let stored = h.store.receptions_for(pvz).await;
        let open_count = stored.iter().filter(|r| r.is_open()).count();
        assert!(open_count <= 1);
        assert_eq!(stored.len(), opened);
        assert_eq!(stored.len() - open_count, closed);
    }

    #[tokio::test]
    async fn test_errors_are_audited() {
        let h = harness();
        let pvz = h.pvz().await;
        let _ = h.workflow.close_reception(&h.ctx, pvz).await;

        let records = h.audit.records();
        assert_eq!(
            records,
            vec![Record::Workflow {
                request_id: "test-request".to_owned(),
                operation: "close_reception",
                error: "no active reception".to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn test_storage_failure_is_surfaced() {
        let h = harness();
        let pvz = h.pvz().await;
        h.store.set_unavailable(true);

        let err = h.workflow.open_reception(&h.ctx, pvz).await.unwrap_err();
        assert!(matches!(err, IntakeError::Storage(_)));
    }

    #[test]
    fn test_list_filter_bounds() {
        let f = IntakeWorkflow::list_filter(None, None, None, None).unwrap();
        assert_eq!((f.page, f.limit), (1, 10));

        let f = IntakeWorkflow::list_filter(None, None, Some(2), Some(50)).unwrap();
        assert_eq!((f.page, f.limit), (2, 30));

        let f = IntakeWorkflow::list_filter(None, None, None, Some(0)).unwrap();
        assert_eq!(f.limit, 1);

        assert!(matches!(
            IntakeWorkflow::list_filter(None, None, Some(0), None),
            Err(IntakeError::Validation(_))
        ));

        let now = Utc::now();
        assert!(matches!(
            IntakeWorkflow::list_filter(Some(now), Some(now - Duration::days(1)), None, None),
            Err(IntakeError::Validation(_))
        ));
        assert!(IntakeWorkflow::list_filter(Some(now), Some(now), None, None).is_ok());
    }

    #[tokio::test]
    async fn test_listing_clamps_to_thirty() {
        let h = harness();
        for _ in 0..35 {
            h.pvz().await;
        }
        let filter = IntakeWorkflow::list_filter(None, None, Some(1), Some(50)).unwrap();
        let page = h.workflow.list_pickup_points(&h.ctx, &filter).await.unwrap();
        assert_eq!(page.len(), 30);

        let filter = IntakeWorkflow::list_filter(None, None, Some(2), Some(50)).unwrap();
        let page = h.workflow.list_pickup_points(&h.ctx, &filter).await.unwrap();
        assert_eq!(page.len(), 5);
    }
}
