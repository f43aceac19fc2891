//! Audit records for gate decisions and workflow errors.

use pvz_core::Role;

use crate::context::RequestContext;

/// Final outcome of an access-gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcomeKind {
    Public,
    Allowed,
    Unauthenticated,
    Forbidden,
}

impl GateOutcomeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Allowed => "allowed",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
        }
    }
}

/// One access-gate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision<'a> {
    pub role: Option<Role>,
    pub path: &'a str,
    pub method: &'a str,
    pub outcome: GateOutcomeKind,
}

/// Sink for audit records.
///
/// Implementations must not fail or block the caller.
pub trait AuditLogger: Send + Sync {
    fn gate_decision(&self, ctx: &RequestContext, decision: &GateDecision<'_>);

    fn workflow_error(&self, ctx: &RequestContext, operation: &'static str, error: &str);
}

/// Audit logger that emits structured `tracing` events on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn gate_decision(&self, ctx: &RequestContext, decision: &GateDecision<'_>) {
        let role = decision.role.map_or("none", pvz_core::Role::as_str);
        match decision.outcome {
            GateOutcomeKind::Public | GateOutcomeKind::Allowed => tracing::info!(
                target: "audit",
                request_id = %ctx,
                role,
                path = decision.path,
                method = decision.method,
                outcome = decision.outcome.as_str(),
                "gate decision"
            ),
            GateOutcomeKind::Unauthenticated | GateOutcomeKind::Forbidden => tracing::warn!(
                target: "audit",
                request_id = %ctx,
                role,
                path = decision.path,
                method = decision.method,
                outcome = decision.outcome.as_str(),
                "gate decision"
            ),
        }
    }

    fn workflow_error(&self, ctx: &RequestContext, operation: &'static str, error: &str) {
        tracing::info!(
            target: "audit",
            request_id = %ctx,
            operation,
            error,
            "workflow error"
        );
    }
}

/// Audit logger that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLogger;

impl AuditLogger for NoopAuditLogger {
    fn gate_decision(&self, _ctx: &RequestContext, _decision: &GateDecision<'_>) {}

    fn workflow_error(&self, _ctx: &RequestContext, _operation: &'static str, _error: &str) {}
}
