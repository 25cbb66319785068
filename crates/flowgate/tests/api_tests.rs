//! API integration tests for the synchronous endpoints.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{build_app, default_views, test_config};
use flowgate::api::ApiResult;
use flowgate::api::views::{ViewHandler, ViewRegistry, ViewRequest};
use flowgate::auth::SessionAuthenticator;

fn app() -> (axum::Router, flowgate::api::AppState) {
    let (router, state, _manager) = build_app(test_config("ws://127.0.0.1:1"), default_views());
    (router, state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Test that the health endpoint works without authentication.
#[tokio::test]
async fn test_health_endpoint() {
    let (router, _state) = app();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["bus"].is_string());
}

/// Login issues the session cookie; the cookie value is the session id the
/// store resolves afterwards.
#[tokio::test]
async fn test_login_sets_session_cookie() {
    let (router, state) = app();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/login")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"username":"dev"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.contains("fg_sess="));

    let token = cookie
        .split("fg_sess=")
        .nth(1)
        .and_then(|rest| rest.split(';').next())
        .unwrap()
        .to_string();

    let json = body_json(response).await;
    assert_eq!(json["logged_in"], true);

    // The cookie value resolves in the session store, bit for bit.
    let identity = state.sessions.resolve(&token).await.unwrap();
    assert_eq!(identity.session_id, token);
    assert_eq!(identity.user.as_deref(), Some("dev"));
}

/// A view call with a valid cookie dispatches through the registry.
#[tokio::test]
async fn test_view_dispatch_with_cookie() {
    let (router, state) = app();
    state.sessions.admit("sess-view", None);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/ping")
                .method(Method::POST)
                .header(header::COOKIE, "fg_sess=sess-view")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["pong"], true);
}

/// A view call without a cookie is rejected with the structured body.
#[tokio::test]
async fn test_view_requires_auth() {
    let (router, _state) = app();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/ping")
                .method(Method::POST)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Please login");
    assert_eq!(json["code"], 401);
}

/// Unknown view names 404 at dispatch time.
#[tokio::test]
async fn test_unknown_view_not_found() {
    let (router, state) = app();
    state.sessions.admit("sess-view", None);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/no-such-view")
                .method(Method::POST)
                .header(header::COOKIE, "fg_sess=sess-view")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], 404);
}

struct StatusView;

#[async_trait]
impl ViewHandler for StatusView {
    fn anonymous(&self) -> bool {
        true
    }

    async fn call(&self, _req: ViewRequest) -> ApiResult<Value> {
        Ok(json!({ "open": true }))
    }
}

/// Anonymous views skip the authentication check.
#[tokio::test]
async fn test_anonymous_view_skips_auth() {
    let views = ViewRegistry::builder()
        .register("status", Arc::new(StatusView))
        .build();
    let (router, _state, _manager) = build_app(test_config("ws://127.0.0.1:1"), views);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/status")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["open"], true);
}

/// A malformed JSON body is a 400, not a fault.
#[tokio::test]
async fn test_malformed_body_rejected() {
    let (router, state) = app();
    state.sessions.admit("sess-view", None);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/ping")
                .method(Method::POST)
                .header(header::COOKIE, "fg_sess=sess-view")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{broken"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], 400);
}

/// Logout revokes the session; later view calls with the same cookie fail.
#[tokio::test]
async fn test_logout_revokes_session() {
    let (router, state) = app();
    state.sessions.admit("sess-bye", None);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/logout")
                .method(Method::POST)
                .header(header::COOKIE, "fg_sess=sess-bye")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["logged_out"], true);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/ping")
                .method(Method::POST)
                .header(header::COOKIE, "fg_sess=sess-bye")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
