//! Access gate: token resolution, anti-forgery check, and policy lookup.
//!
//! For every non-public request the gate:
//! 1. takes the identity token from the `JWT` cookie, else from
//!    `Authorization: Bearer`;
//! 2. validates signature and expiry before reading the role;
//! 3. for cookie tokens on unsafe methods, requires `X-CSRF-Token` to equal
//!    the `csrf_token` cookie;
//! 4. asks the [`PolicyTable`] for a decision.
//!
//! Each decision is sent to the audit log.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cookie::Cookie;
use thiserror::Error;
use tracing::Span;

use pvz_core::Role;

use crate::context::RequestContext;
use crate::error::AppError;
use crate::services::audit::{AuditLogger, GateDecision, GateOutcomeKind};
use crate::services::auth::{TokenCodec, TokenError};
use crate::services::policy::{Effect, PolicyTable};
use crate::state::AppState;

/// Cookie carrying the identity token.
pub const TOKEN_COOKIE: &str = "JWT";

/// Cookie carrying the anti-forgery token.
pub const CSRF_COOKIE: &str = "csrf_token";

/// Header that must echo the anti-forgery cookie.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Why the gate refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateRejection {
    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),
}

/// Successful gate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Public path; no role was resolved.
    Public,
    /// Token verified and policy allowed the call.
    Allowed(Role),
}

/// Where the identity token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenSource {
    Cookie,
    Bearer,
}

/// Per-request authorization check.
#[derive(Clone)]
pub struct AccessGate {
    policy: PolicyTable,
    tokens: TokenCodec,
    audit: Arc<dyn AuditLogger>,
}

impl AccessGate {
    #[must_use]
    pub fn new(policy: PolicyTable, tokens: TokenCodec, audit: Arc<dyn AuditLogger>) -> Self {
        Self {
            policy,
            tokens,
            audit,
        }
    }

    /// Decide whether a request may proceed.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` for a missing or invalid token and
    /// `Forbidden` for an anti-forgery mismatch or a policy denial.
    pub fn check(
        &self,
        ctx: &RequestContext,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<GateOutcome, GateRejection> {
        let (role, result) = self.decide(method, path, headers);

        let outcome = match &result {
            Ok(GateOutcome::Public) => GateOutcomeKind::Public,
            Ok(GateOutcome::Allowed(_)) => GateOutcomeKind::Allowed,
            Err(GateRejection::Unauthenticated(_)) => GateOutcomeKind::Unauthenticated,
            Err(GateRejection::Forbidden(_)) => GateOutcomeKind::Forbidden,
        };
        self.audit.gate_decision(
            ctx,
            &GateDecision {
                role,
                path,
                method: method.as_str(),
                outcome,
            },
        );

        result
    }

    fn decide(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> (Option<Role>, Result<GateOutcome, GateRejection>) {
        if PolicyTable::is_public(path) {
            return (None, Ok(GateOutcome::Public));
        }

        let Some((token, source)) = extract_token(headers) else {
            return (None, Err(GateRejection::Unauthenticated("missing token")));
        };

        let role = match self.tokens.validate(&token) {
            Ok(role) => role,
            Err(TokenError::Expired) => {
                return (None, Err(GateRejection::Unauthenticated("token expired")));
            }
            Err(_) => return (None, Err(GateRejection::Unauthenticated("invalid token"))),
        };

        if source == TokenSource::Cookie && !is_safe_method(method) && !csrf_matches(headers) {
            return (
                Some(role),
                Err(GateRejection::Forbidden("csrf token mismatch")),
            );
        }

        match self.policy.decide(role, path, method.as_str()) {
            Effect::Allow => (Some(role), Ok(GateOutcome::Allowed(role))),
            Effect::Deny => (Some(role), Err(GateRejection::Forbidden("access denied"))),
        }
    }
}

/// Axum middleware running the [`AccessGate`] in front of the API routes.
pub async fn access_gate_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(RequestContext::generate);

    match state
        .gate()
        .check(&ctx, request.method(), request.uri().path(), request.headers())
    {
        Ok(GateOutcome::Public) => next.run(request).await,
        Ok(GateOutcome::Allowed(role)) => {
            Span::current().record("role", role.as_str());
            next.run(request).await
        }
        Err(rejection) => AppError::from(rejection).into_response(),
    }
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn extract_token(headers: &HeaderMap) -> Option<(String, TokenSource)> {
    if let Some(token) = cookie_value(headers, TOKEN_COOKIE).filter(|t| !t.is_empty()) {
        return Some((token, TokenSource::Cookie));
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| (t.to_owned(), TokenSource::Bearer))
}

fn csrf_matches(headers: &HeaderMap) -> bool {
    let header = headers.get(CSRF_HEADER).and_then(|h| h.to_str().ok());
    let cookie = cookie_value(headers, CSRF_COOKIE);
    matches!((header, cookie), (Some(h), Some(c)) if !c.is_empty() && h == c)
}

/// Find a cookie by name across all `Cookie` headers.
///
/// Unparseable pairs are skipped and surrounding double quotes are removed.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value_trimmed().to_owned())
}
