//! HTTP route handlers for the intake service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness check
//! GET  /health/ready                    - Readiness check (database ping)
//! GET  /metrics                         - Prometheus text exposition
//!
//! # Tokens (public)
//! POST /dummyLogin                      - Token for a role, no credentials
//! POST /register                        - Create user, issue token
//! POST /login                           - Email + password, issue token
//!
//! # Pickup points (gated)
//! POST /pvz                             - Create pickup point (moderator)
//! GET  /pvz                             - List with receptions and products
//! POST /pvz/{pvzId}/close_last_reception - Close open reception (employee)
//! POST /pvz/{pvzId}/delete_last_product  - Remove newest product (employee)
//!
//! # Intake (gated, employee)
//! POST /receptions                      - Open a reception
//! POST /products                        - Add a product to the open reception
//! ```

pub mod auth;
pub mod extract;
pub mod products;
pub mod pvz;
pub mod receptions;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use pvz_core::{PickupPointId, parse_id};

use crate::error::{AppError, Result};
use crate::middleware::{access_gate_middleware, request_id_middleware, track_requests};
use crate::state::AppState;

/// Content type of the Prometheus text format.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Build the full application router.
///
/// The access gate runs only on matched API routes; health and metrics stay
/// outside it.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/dummyLogin", post(auth::dummy_login))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/pvz", post(pvz::create).get(pvz::list))
        .route(
            "/pvz/{pvzId}/close_last_reception",
            post(receptions::close_last),
        )
        .route(
            "/pvz/{pvzId}/delete_last_product",
            post(products::delete_last),
        )
        .route("/receptions", post(receptions::open))
        .route("/products", post(products::add))
        .route_layer(from_fn_with_state(state.clone(), access_gate_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics))
        .merge(api)
        .layer(from_fn_with_state(state.clone(), track_requests))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Liveness probe.
async fn health() -> &'static str {
    "ok"
}

/// Readiness probe - verifies the database answers.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Result<Response> {
    let Some(prometheus) = state.prometheus() else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let body = prometheus
        .encode_text()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response())
}

/// Parse the `{pvzId}` path segment.
pub(crate) fn parse_pvz_id(raw: &str) -> Result<PickupPointId> {
    parse_id(raw).ok_or_else(|| AppError::BadRequest("invalid pvzId".to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{HeaderValue, Method, Request};
    use http_body_util::BodyExt;
    use pvz_core::Role;
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::REQUEST_ID_HEADER;
    use crate::services::auth::TokenCodec;
    use crate::state::Telemetry;

    const SECRET: &str = "k3Jd9!xQ2mZ7@pL4vN8#rT1wY6$hB5cF";

    fn app(telemetry: Telemetry) -> (Router, AppState, TokenCodec) {
        let tokens = TokenCodec::new(&SecretString::from(SECRET.to_owned()));
        let (state, _) = AppState::in_memory(tokens.clone(), telemetry);
        (router(state.clone()), state, tokens)
    }

    fn bearer(tokens: &TokenCodec, role: Role) -> String {
        let token = tokens.issue(role, Duration::from_secs(60)).unwrap().token;
        format!("Bearer {token}")
    }

    fn json_request(method: Method, uri: &str, auth: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _, _) = app(Telemetry::noop());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_create_pvz_without_token_is_401_json() {
        let (app, _, _) = app(Telemetry::noop());
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/pvz",
                None,
                &json!({ "city": "Москва" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "missing token");
    }

    #[tokio::test]
    async fn test_create_pvz_as_moderator() {
        let (app, _, tokens) = app(Telemetry::noop());
        let auth = bearer(&tokens, Role::Moderator);
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/pvz",
                Some(&auth),
                &json!({ "city": "Казань" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["city"], "Казань");
        assert!(body["id"].is_string());
        assert!(body["registrationDate"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_city_is_400() {
        let (app, _, tokens) = app(Telemetry::noop());
        let auth = bearer(&tokens, Role::Moderator);
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/pvz",
                Some(&auth),
                &json!({ "city": "Новосибирск" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dummy_login_sets_cookies_and_csrf_header() {
        let (app, _, _) = app(Telemetry::noop());
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/dummyLogin",
                None,
                &json!({ "role": "employee" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies: Vec<&str> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().any(|c| c.starts_with("JWT=") && c.contains("HttpOnly")));
        assert!(cookies.iter().any(|c| c.starts_with("csrf_token=")));
        assert!(response.headers().contains_key("x-csrf-token"));

        let body = body_json(response).await;
        assert!(body.is_string());
    }

    #[tokio::test]
    async fn test_dummy_login_rejects_unknown_role() {
        let (app, _, _) = app(Telemetry::noop());
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/dummyLogin",
                None,
                &json!({ "role": "admin" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_400() {
        let (app, _, _) = app(Telemetry::noop());
        let request = Request::post("/dummyLogin")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_bad_path_id_is_400() {
        let (app, _, tokens) = app(Telemetry::noop());
        let auth = bearer(&tokens, Role::Employee);
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/pvz/not-a-uuid/close_last_reception",
                Some(&auth),
                &json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "invalid pvzId");
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let (app, _, _) = app(Telemetry::noop());
        let request = Request::get("/health")
            .header(REQUEST_ID_HEADER, "req-42")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER),
            Some(&HeaderValue::from_static("req-42"))
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, state, _) = app(Telemetry::production().unwrap());

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/pvz", None, &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!((state.prometheus().unwrap().request_count("/pvz", 401) - 1.0).abs() < f64::EPSILON);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("pvz_http_requests_total"));
    }

    #[tokio::test]
    async fn test_metrics_absent_without_registry() {
        let (app, _, _) = app(Telemetry::noop());
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_readiness_follows_store() {
        let tokens = TokenCodec::new(&SecretString::from(SECRET.to_owned()));
        let (state, store) = AppState::in_memory(tokens, Telemetry::noop());
        let app = router(state);

        let ready = |app: Router| async move {
            app.oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
                .await
                .unwrap()
                .status()
        };

        assert_eq!(ready(app.clone()).await, StatusCode::OK);
        store.set_unavailable(true);
        assert_eq!(ready(app).await, StatusCode::SERVICE_UNAVAILABLE);
    }
}
