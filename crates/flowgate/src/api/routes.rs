//! API route definitions.

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::handlers;
use super::state::AppState;
use crate::ws::ws_handler;

/// Create the application router.
///
/// `/ws`, `/login`, `/logout` and `/health` are fixed; everything else
/// resolves through the startup-built view registry.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/login", get(handlers::login).post(handlers::login))
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route("/ws", get(ws_handler))
        .route(
            "/{view}",
            get(handlers::dispatch_view).post(handlers::dispatch_view),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the CORS layer from configured origins.
///
/// Credentials are always allowed since the session cookie must cross the
/// origin boundary. In debug mode localhost origins are filled in when none
/// are configured; otherwise an empty origin list denies cross-origin
/// requests.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
        header::COOKIE,
    ];

    let mut origins: Vec<HeaderValue> = state
        .config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                warn!("CORS: invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if origins.is_empty() && state.config.debug {
        warn!("CORS: no origins configured, allowing localhost origins in debug mode");
        for origin in ["http://localhost:3000", "http://127.0.0.1:3000"] {
            if let Ok(value) = origin.parse::<HeaderValue>() {
                origins.push(value);
            }
        }
    }

    if origins.is_empty() {
        warn!("CORS: no origins configured, denying cross-origin requests");
        CorsLayer::new()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
    }
}
