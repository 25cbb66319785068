//! WebSocket handler for client connections.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum_extra::extract::CookieJar;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::error::ErrorBody;
use crate::api::state::AppState;
use crate::auth::AuthError;
use crate::registry::{OUTBOUND_BUFFER, Outbound};
use crate::router;

/// Keepalive ping interval.
const PING_INTERVAL_SECS: u64 = 30;

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ws: WebSocketUpgrade,
) -> Response {
    let token = jar
        .get(&state.config.auth.cookie_name)
        .map(|c| c.value().to_string());
    ws.on_upgrade(move |socket| handle_connection(socket, state, token))
}

async fn handle_connection(mut socket: WebSocket, state: AppState, token: Option<String>) {
    // Resolve the cookie before anything is registered. A missing cookie
    // and a rejected token get the same answer.
    let resolved = match token {
        Some(token) => state.authenticator.resolve(&token).await,
        None => Err(AuthError::MissingToken),
    };
    let identity = match resolved {
        Ok(identity) => identity,
        Err(err) => {
            debug!(%err, "handshake rejected");
            reject(&mut socket, "Please login", 401).await;
            return;
        }
    };
    let session_id = identity.session_id;

    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let conn_id = match state.registry.register(&session_id, outbound_tx) {
        Ok(conn_id) => conn_id,
        Err(err) => {
            warn!(%session_id, %err, "registration refused");
            reject(&mut socket, "Service unavailable", 503).await;
            return;
        }
    };
    info!(%session_id, conn_id, "client connected");

    let (mut sender, mut receiver) = socket.split();

    // Writer task: owns the outbound half. Frames arrive from the dispatcher
    // through the registry handle; Close means this handle was evicted by a
    // newer registration.
    let writer_session = session_id.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        loop {
            tokio::select! {
                out = outbound_rx.recv() => {
                    match out {
                        Some(Outbound::Frame(json)) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Close) => {
                            debug!(session_id = %writer_session, "handle evicted; closing socket");
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader loop: every text frame is routed to the bus. Per-message
    // failures are logged and dropped without touching the connection.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(err) = router::route(&state.registry, &state.bus, &session_id, text.as_str())
                {
                    warn!(%session_id, %err, "dropping inbound frame");
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(%session_id, "binary frame ignored");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(%session_id, "client closed connection");
                break;
            }
            Err(err) => {
                warn!(%session_id, %err, "client socket error");
                break;
            }
        }
    }

    writer.abort();
    state.registry.unregister(&session_id, conn_id);
    info!(%session_id, conn_id, "client disconnected");
}

/// Send one error frame and close without registering.
async fn reject(socket: &mut WebSocket, message: &str, code: u16) {
    let body = ErrorBody {
        error: message.to_string(),
        code,
    };
    if let Ok(json) = serde_json::to_string(&body) {
        let _ = socket.send(Message::Text(json.into())).await;
    }
    let _ = socket.send(Message::Close(None)).await;
}
