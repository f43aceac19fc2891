//! Token and role checks in front of every gated route.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use axum::http::{Method, StatusCode};
use pvz_core::Role;
use pvz_integration_tests::{Auth, TestApp};
use pvz_service::services::auth::TokenCodec;
use secrecy::SecretString;
use serde_json::json;

const PVZ_ID: &str = "0d4c0b8e-2a53-4a0e-9d0b-6e1c7e6a0f11";

#[tokio::test]
async fn test_create_pvz_requires_moderator() {
    let app = TestApp::new();
    let body = json!({ "city": "Москва" });

    let anonymous = app.post("/pvz", &Auth::Anonymous, &body).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.message(), "missing token");

    let employee = app.login_as(Role::Employee).await;
    let denied = app.post("/pvz", &employee, &body).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.message(), "access denied");

    let moderator = app.login_as(Role::Moderator).await;
    let created = app.post("/pvz", &moderator, &body).await;
    assert_eq!(created.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_employee_routes_reject_moderator() {
    let app = TestApp::new();
    let moderator = app.login_as(Role::Moderator).await;

    let cases = [
        ("/receptions".to_owned(), json!({ "pvzId": PVZ_ID })),
        ("/products".to_owned(), json!({ "type": "обувь", "pvzId": PVZ_ID })),
        (format!("/pvz/{PVZ_ID}/close_last_reception"), json!({})),
        (format!("/pvz/{PVZ_ID}/delete_last_product"), json!({})),
    ];

    for (uri, body) in &cases {
        let anonymous = app.post(uri, &Auth::Anonymous, body).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED, "{uri}");

        let response = app.post(uri, &moderator, body).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn test_listing_is_gated_but_open_to_both_roles() {
    let app = TestApp::new();

    let anonymous = app.get("/pvz", &Auth::Anonymous).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    for role in Role::ALL {
        let auth = app.login_as(*role).await;
        let response = app.get("/pvz", &auth).await;
        assert_eq!(response.status, StatusCode::OK, "{role}");
        assert_eq!(response.body, json!([]));
    }
}

#[tokio::test]
async fn test_forged_and_garbage_tokens_are_unauthenticated() {
    let app = TestApp::new();
    let forger = TokenCodec::new(&SecretString::from(
        "Zq8%Lm3^Vb6&Nx1*Kc4(Jd7)Hs0_Gf2+".to_owned(),
    ));
    let forged = forger
        .issue(Role::Moderator, Duration::from_secs(60))
        .unwrap()
        .token;

    let body = json!({ "city": "Москва" });
    let response = app.post("/pvz", &Auth::Bearer(forged), &body).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), "invalid token");

    let response = app
        .post("/pvz", &Auth::Bearer("not.a.token".to_owned()), &body)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), "invalid token");

    // Nothing reached the workflow
    let moderator = app.login_as(Role::Moderator).await;
    assert_eq!(app.get("/pvz", &moderator).await.body, json!([]));
}

#[tokio::test]
async fn test_public_and_probe_routes_need_no_token() {
    let app = TestApp::new();

    assert_eq!(
        app.get("/health", &Auth::Anonymous).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.get("/health/ready", &Auth::Anonymous).await.status,
        StatusCode::OK
    );

    let response = app
        .post("/dummyLogin", &Auth::Anonymous, &json!({ "role": "moderator" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_wrong_method_is_not_a_policy_bypass() {
    let app = TestApp::new();
    let employee = app.login_as(Role::Employee).await;

    let response = app
        .request(Method::GET, "/receptions", &employee, None)
        .await;
    assert!(!response.status.is_success());

    let response = app
        .request(Method::DELETE, "/pvz", &Auth::Anonymous, None)
        .await;
    assert_ne!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_store_outage_is_opaque_500() {
    let app = TestApp::new();
    let moderator = app.login_as(Role::Moderator).await;
    app.store().set_unavailable(true);

    let response = app
        .post("/pvz", &moderator, &json!({ "city": "Москва" }))
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.message(), "internal server error");

    let ready = app.get("/health/ready", &Auth::Anonymous).await;
    assert_eq!(ready.status, StatusCode::SERVICE_UNAVAILABLE);
}
