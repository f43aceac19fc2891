//! Prometheus counters for entity creation and request outcomes.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `pvz_created_total` | Counter | `kind` |
//! | `pvz_http_requests_total` | Counter | `path`, `status` |
//!
//! Recording is fire-and-forget: a [`MetricsSink`] method never fails.

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Maximum length in bytes for label values.
pub const MAX_LABEL_VALUE_LEN: usize = 64;

/// Errors that can occur while setting up or exporting metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Kind of entity counted by `pvz_created_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    PickupPoint,
    Reception,
    Product,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PickupPoint => "pvz",
            Self::Reception => "reception",
            Self::Product => "product",
        }
    }
}

/// Destination for service counters.
pub trait MetricsSink: Send + Sync {
    fn entity_created(&self, kind: EntityKind);

    /// Record one finished HTTP request against its route template.
    fn request_completed(&self, path: &str, status: u16);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn entity_created(&self, _kind: EntityKind) {}

    fn request_completed(&self, _path: &str, _status: u16) {}
}

/// Sink backed by a private Prometheus registry.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    created_total: CounterVec,
    http_requests_total: CounterVec,
}

impl PrometheusMetrics {
    /// Create the counters and register them.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric fails to register.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let created_total = CounterVec::new(
            Opts::new("pvz_created_total", "Entities created by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(created_total.clone()))?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "pvz_http_requests_total",
                "HTTP requests by route and status",
            ),
            &["path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            registry,
            created_total,
            http_requests_total,
        })
    }

    /// Encode all metrics in Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }

    #[must_use]
    pub fn created_count(&self, kind: EntityKind) -> f64 {
        self.created_total.with_label_values(&[kind.as_str()]).get()
    }

    #[must_use]
    pub fn request_count(&self, path: &str, status: u16) -> f64 {
        self.http_requests_total
            .with_label_values(&[truncate_label(path), &status.to_string()])
            .get()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn entity_created(&self, kind: EntityKind) {
        self.created_total.with_label_values(&[kind.as_str()]).inc();
    }

    fn request_completed(&self, path: &str, status: u16) {
        self.http_requests_total
            .with_label_values(&[truncate_label(path), &status.to_string()])
            .inc();
    }
}

/// Cut a label value to at most [`MAX_LABEL_VALUE_LEN`] bytes on a char boundary.
fn truncate_label(value: &str) -> &str {
    if value.len() <= MAX_LABEL_VALUE_LEN {
        return value;
    }
    let end = value
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= MAX_LABEL_VALUE_LEN)
        .last()
        .unwrap_or(0);
    value.get(..end).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment_and_encode() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.entity_created(EntityKind::Product);
        metrics.entity_created(EntityKind::Product);
        metrics.request_completed("/pvz", 201);

        assert_eq!(metrics.created_count(EntityKind::Product), 2.0);
        assert_eq!(metrics.created_count(EntityKind::Reception), 0.0);
        assert_eq!(metrics.request_count("/pvz", 201), 1.0);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("pvz_created_total{kind=\"product\"} 2"));
        assert!(text.contains("pvz_http_requests_total"));
    }

    #[test]
    fn test_truncate_label_respects_char_boundaries() {
        let short = "/pvz/{pvzId}/close_last_reception";
        assert_eq!(truncate_label(short), short);

        // Two-byte Cyrillic characters straddle the limit.
        let long = "ж".repeat(40);
        let cut = truncate_label(&long);
        assert!(cut.len() <= MAX_LABEL_VALUE_LEN);
        assert_eq!(cut.chars().count(), 32);
    }
}
