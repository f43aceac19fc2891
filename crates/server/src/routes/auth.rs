//! Token issuance routes: `/dummyLogin`, `/register`, `/login`.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use cookie::{Cookie, SameSite, time::Duration};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::middleware::access_gate::{CSRF_COOKIE, CSRF_HEADER, TOKEN_COOKIE};
use crate::routes::extract::ApiJson;
use crate::services::auth::IssuedCredentials;
use crate::state::{AppState, SessionSettings};

#[derive(Debug, Deserialize)]
pub struct DummyLoginRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /dummyLogin`: issue a token for a role without credentials.
pub async fn dummy_login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<DummyLoginRequest>,
) -> Result<Response> {
    let creds = state.auth().dummy_login(&body.role)?;
    let headers = credential_headers(&creds, state.session())?;
    Ok((StatusCode::OK, headers, Json(creds.access_token)).into_response())
}

/// `POST /register`: create a user and sign them in.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<Response> {
    let (user, creds) = state
        .auth()
        .register(&body.email, &body.password, &body.role)
        .await?;
    let headers = credential_headers(&creds, state.session())?;
    Ok((StatusCode::CREATED, headers, Json(user)).into_response())
}

/// `POST /login`: check email and password, then issue a token.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Response> {
    let creds = state.auth().login(&body.email, &body.password).await?;
    let headers = credential_headers(&creds, state.session())?;
    Ok((StatusCode::OK, headers, Json(creds.access_token)).into_response())
}

/// Build the `Set-Cookie` and anti-forgery headers for issued credentials.
fn credential_headers(creds: &IssuedCredentials, session: SessionSettings) -> Result<HeaderMap> {
    let max_age = Duration::seconds((creds.expires_at - Utc::now()).num_seconds().max(0));

    let token_cookie = Cookie::build((TOKEN_COOKIE, creds.access_token.as_str()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .secure(session.secure_cookies)
        .build();
    let csrf_cookie = Cookie::build((CSRF_COOKIE, creds.csrf_token.as_str()))
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .secure(session.secure_cookies)
        .build();

    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, header_value(&token_cookie.to_string())?);
    headers.append(header::SET_COOKIE, header_value(&csrf_cookie.to_string())?);
    headers.insert(
        HeaderName::from_static(CSRF_HEADER),
        header_value(&creds.csrf_token)?,
    );
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Internal(format!("invalid credential header: {e}")))
}
