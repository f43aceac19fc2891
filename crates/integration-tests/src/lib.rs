//! Integration test harness for the PVZ intake service.
//!
//! Drives the full application router (middleware included) over the
//! in-memory store, so no database or network listener is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pvz-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `intake_scenario` - Reception lifecycle through the HTTP surface
//! - `access_gate` - Token and role checks on every gated route
//! - `credentials` - Registration, login, cookies and anti-forgery tokens

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc)]

use axum::Router;
use cookie::Cookie;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use pvz_core::Role;
use pvz_service::db::MemoryStore;
use pvz_service::routes;
use pvz_service::services::auth::TokenCodec;
use pvz_service::state::{AppState, Telemetry};

/// Signing secret shared by every test app.
pub const TEST_JWT_SECRET: &str = "k3Jd9!xQ2mZ7@pL4vN8#rT1wY6$hB5cF";

/// How a request presents its identity token.
#[derive(Debug, Clone, Default)]
pub enum Auth {
    #[default]
    Anonymous,
    Bearer(String),
    /// Cookie-carried token; `csrf_header` is echoed in `X-CSRF-Token` when set.
    Cookie {
        token: String,
        csrf_cookie: String,
        csrf_header: Option<String>,
    },
}

impl Auth {
    /// Attach the matching anti-forgery header to a cookie session.
    #[must_use]
    pub fn with_csrf_header(self) -> Self {
        match self {
            Self::Cookie {
                token, csrf_cookie, ..
            } => Self::Cookie {
                token,
                csrf_header: Some(csrf_cookie.clone()),
                csrf_cookie,
            },
            other => other,
        }
    }
}

/// Buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `message` field of an error body.
    #[must_use]
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }

    /// Value of a cookie set by this response.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| Cookie::parse(v).ok())
            .find(|c| c.name() == name)
            .map(|c| c.value().to_owned())
    }
}

/// A running application over a fresh in-memory store.
pub struct TestApp {
    router: Router,
    state: AppState,
    store: MemoryStore,
    tokens: TokenCodec,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_telemetry(Telemetry::noop())
    }

    #[must_use]
    pub fn with_telemetry(telemetry: Telemetry) -> Self {
        let tokens = TokenCodec::new(&SecretString::from(TEST_JWT_SECRET.to_owned()));
        let (state, store) = AppState::in_memory(tokens.clone(), telemetry);
        Self {
            router: routes::router(state.clone()),
            state,
            store,
            tokens,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Send one request through the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        auth: &Auth,
        body: Option<&Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);

        match auth {
            Auth::Anonymous => {}
            Auth::Bearer(token) => {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            Auth::Cookie {
                token,
                csrf_cookie,
                csrf_header,
            } => {
                let jar = [
                    Cookie::new("JWT", token.as_str()),
                    Cookie::new("csrf_token", csrf_cookie.as_str()),
                ];
                let pairs: Vec<String> = jar.iter().map(|c| c.stripped().to_string()).collect();
                builder = builder.header(header::COOKIE, pairs.join("; "));
                if let Some(csrf) = csrf_header {
                    builder = builder.header("x-csrf-token", csrf);
                }
            }
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("readable body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, auth: &Auth) -> TestResponse {
        self.request(Method::GET, uri, auth, None).await
    }

    pub async fn post(&self, uri: &str, auth: &Auth, body: &Value) -> TestResponse {
        self.request(Method::POST, uri, auth, Some(body)).await
    }

    /// Obtain a bearer credential for `role` through `/dummyLogin`.
    pub async fn login_as(&self, role: Role) -> Auth {
        let response = self
            .post(
                "/dummyLogin",
                &Auth::Anonymous,
                &serde_json::json!({ "role": role.as_str() }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "dummyLogin failed");
        let token = response
            .body
            .as_str()
            .expect("token body is a JSON string")
            .to_owned();
        Auth::Bearer(token)
    }

    /// Obtain a cookie session for `role` through `/dummyLogin`, without the
    /// anti-forgery header.
    pub async fn cookie_session(&self, role: Role) -> Auth {
        let response = self
            .post(
                "/dummyLogin",
                &Auth::Anonymous,
                &serde_json::json!({ "role": role.as_str() }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "dummyLogin failed");
        Auth::Cookie {
            token: response.cookie("JWT").expect("JWT cookie"),
            csrf_cookie: response.cookie("csrf_token").expect("csrf cookie"),
            csrf_header: None,
        }
    }

    /// Create a pickup point as a moderator and return its id.
    pub async fn create_pvz(&self, city: &str) -> String {
        let moderator = self.login_as(Role::Moderator).await;
        let response = self
            .post("/pvz", &moderator, &serde_json::json!({ "city": city }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"]
            .as_str()
            .expect("pvz id")
            .to_owned()
    }
}
