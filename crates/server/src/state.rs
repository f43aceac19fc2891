//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::db::{EntityStore, MemoryStore, UserStore};
use crate::middleware::AccessGate;
use crate::services::audit::{AuditLogger, NoopAuditLogger, TracingAuditLogger};
use crate::services::auth::{AuthService, TokenCodec};
use crate::services::intake::IntakeWorkflow;
use crate::services::metrics::{MetricsError, MetricsSink, NoopMetrics, PrometheusMetrics};
use crate::services::policy::PolicyTable;

/// Metrics and audit collaborators injected into the services.
#[derive(Clone)]
pub struct Telemetry {
    pub metrics: Arc<dyn MetricsSink>,
    pub audit: Arc<dyn AuditLogger>,
    /// Registry exposed on `/metrics`, when Prometheus is in use.
    pub prometheus: Option<PrometheusMetrics>,
}

impl Telemetry {
    /// Prometheus counters and `tracing` audit events.
    ///
    /// # Errors
    ///
    /// Returns an error if the counters cannot be registered.
    pub fn production() -> Result<Self, MetricsError> {
        let prometheus = PrometheusMetrics::new()?;
        Ok(Self {
            metrics: Arc::new(prometheus.clone()),
            audit: Arc::new(TracingAuditLogger),
            prometheus: Some(prometheus),
        })
    }

    /// Collaborators that record nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            metrics: Arc::new(NoopMetrics),
            audit: Arc::new(NoopAuditLogger),
            prometheus: None,
        }
    }
}

/// Token lifetime and cookie flags for issued credentials.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub token_ttl: Duration,
    pub secure_cookies: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(24 * 60 * 60),
            secure_cookies: false,
        }
    }
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn EntityStore>,
    intake: IntakeWorkflow,
    auth: AuthService,
    gate: AccessGate,
    telemetry: Telemetry,
    session: SessionSettings,
}

impl AppState {
    /// Wire the services over the given stores.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        users: Arc<dyn UserStore>,
        tokens: TokenCodec,
        session: SessionSettings,
        telemetry: Telemetry,
    ) -> Self {
        let intake = IntakeWorkflow::new(
            Arc::clone(&store),
            Arc::clone(&telemetry.metrics),
            Arc::clone(&telemetry.audit),
        );
        let auth = AuthService::new(users, tokens.clone(), session.token_ttl);
        let gate = AccessGate::new(
            PolicyTable::standard(),
            tokens,
            Arc::clone(&telemetry.audit),
        );

        Self {
            inner: Arc::new(AppStateInner {
                store,
                intake,
                auth,
                gate,
                telemetry,
                session,
            }),
        }
    }

    /// State over a fresh [`MemoryStore`], returned alongside for inspection.
    #[must_use]
    pub fn in_memory(tokens: TokenCodec, telemetry: Telemetry) -> (Self, MemoryStore) {
        let store = MemoryStore::new();
        let state = Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            tokens,
            SessionSettings::default(),
            telemetry,
        );
        (state, store)
    }

    #[must_use]
    pub fn store(&self) -> &dyn EntityStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn intake(&self) -> &IntakeWorkflow {
        &self.inner.intake
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn gate(&self) -> &AccessGate {
        &self.inner.gate
    }

    #[must_use]
    pub fn metrics(&self) -> &dyn MetricsSink {
        self.inner.telemetry.metrics.as_ref()
    }

    #[must_use]
    pub fn prometheus(&self) -> Option<&PrometheusMetrics> {
        self.inner.telemetry.prometheus.as_ref()
    }

    #[must_use]
    pub fn session(&self) -> SessionSettings {
        self.inner.session
    }
}
