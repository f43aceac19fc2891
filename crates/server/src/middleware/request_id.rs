//! Request ID middleware for request tracing and correlation.
//!
//! Uses the upstream `x-request-id` header when present and generates a UUID
//! v4 otherwise. The id is recorded on the current span, tagged on the Sentry
//! scope, stored as a [`RequestContext`] extension for handlers, and echoed on
//! the response.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;

use crate::context::RequestContext;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest upstream request id that is accepted as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Middleware that ensures every request has a [`RequestContext`].
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let ctx = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(RequestContext::generate, RequestContext::new);

    Span::current().record("request_id", ctx.request_id());

    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", ctx.request_id());
    });

    let header = HeaderValue::from_str(ctx.request_id()).ok();
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;

    if let Some(value) = header {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
