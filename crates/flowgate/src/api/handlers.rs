//! Request handlers for the synchronous endpoints.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use serde_json::{Value, json};
use tracing::info;

use crate::auth::SessionIdentity;
use crate::bus::BusState;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use super::views::ViewRequest;

/// Decode an optional JSON body the way the views expect: empty means `{}`.
fn decode_body(bytes: &Bytes) -> ApiResult<Value> {
    if bytes.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(bytes)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

/// Health endpoint.
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let bus = match state.bus.state() {
        BusState::Disconnected => "disconnected",
        BusState::Connecting => "connecting",
        BusState::Connected => "connected",
        BusState::Reconnecting => "reconnecting",
        BusState::Fatal => "fatal",
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "bus": bus,
    }))
}

/// Login: mint a session and hand the cookie to the client.
///
/// POST /login (GET accepted for parity with legacy clients)
///
/// The cookie value is, bit for bit, the session identifier the registry
/// keys on and the name of the session's bus channel.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> ApiResult<Response> {
    let input = decode_body(&body)?;
    let user = input
        .get("username")
        .and_then(Value::as_str)
        .map(str::to_string);

    let identity = state.sessions.issue(user);
    info!(session_id = %identity.session_id, "session issued");

    let cookie = Cookie::build((
        state.config.auth.cookie_name.clone(),
        identity.session_id.clone(),
    ))
    .path("/")
    .http_only(true)
    .build();
    let jar = jar.add(cookie);

    Ok((jar, Json(json!({ "logged_in": true }))).into_response())
}

/// Logout: revoke the presented session.
///
/// POST /logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Response> {
    let cookie_name = state.config.auth.cookie_name.clone();
    let Some(cookie) = jar.get(&cookie_name) else {
        return Err(ApiError::Unauthorized);
    };
    if !state.sessions.revoke(cookie.value()) {
        return Err(ApiError::Unauthorized);
    }

    let jar = jar.remove(Cookie::new(cookie_name, ""));
    Ok((jar, Json(json!({ "logged_out": true }))).into_response())
}

/// Dispatch a named view from the startup-built registry.
///
/// GET|POST /{view}
pub async fn dispatch_view(
    State(state): State<AppState>,
    Path(name): Path<String>,
    jar: CookieJar,
    body: Bytes,
) -> ApiResult<Response> {
    let Some(view) = state.views.get(&name) else {
        return Err(ApiError::not_found(name));
    };

    let identity = resolve_identity(&state, &jar).await;
    if identity.is_none() && !view.anonymous() {
        return Err(ApiError::Unauthorized);
    }

    let req = ViewRequest {
        identity,
        body: decode_body(&body)?,
    };
    let output = view.call(req).await?;
    Ok(Json(output).into_response())
}

async fn resolve_identity(state: &AppState, jar: &CookieJar) -> Option<SessionIdentity> {
    let cookie = jar.get(&state.config.auth.cookie_name)?;
    state.authenticator.resolve(cookie.value()).await.ok()
}
