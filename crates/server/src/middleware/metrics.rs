//! Per-route request outcome counter.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Label used for requests that matched no route.
const UNMATCHED_PATH: &str = "unmatched";

/// Count every response by route template and status.
pub async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_PATH.to_owned(), |p| p.as_str().to_owned());

    let response = next.run(request).await;
    state
        .metrics()
        .request_completed(&path, response.status().as_u16());
    response
}
