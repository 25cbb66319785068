//! Test utilities and common setup: a mock worker bus and a fully wired
//! bridge application.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};

use flowgate::api::views::{PingView, ViewRegistry};
use flowgate::api::{AppState, create_router};
use flowgate::auth::MemorySessionStore;
use flowgate::bus::{BusFrame, BusManager};
use flowgate::config::AppConfig;
use flowgate::registry::ConnectionRegistry;

const WAIT: Duration = Duration::from_secs(5);

/// Events observed by the mock bus.
#[derive(Debug)]
pub enum BusSeen {
    Connected,
    Frame(BusFrame),
    Disconnected,
}

enum BusControl {
    Deliver(String),
    Drop,
}

/// An in-process stand-in for the worker bus: accepts the bridge's WebSocket
/// connection, records every frame it sends, and can push deliveries or
/// sever the connection on demand.
pub struct MockBus {
    pub url: String,
    seen: mpsc::UnboundedReceiver<BusSeen>,
    control: mpsc::UnboundedSender<BusControl>,
}

impl MockBus {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen) = mpsc::unbounded_channel();
        let (control, mut control_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(mut socket) = accept_async(stream).await else {
                    continue;
                };
                let _ = seen_tx.send(BusSeen::Connected);

                loop {
                    tokio::select! {
                        msg = socket.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(frame) =
                                        serde_json::from_str::<BusFrame>(text.as_str())
                                    {
                                        let _ = seen_tx.send(BusSeen::Frame(frame));
                                    }
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            }
                        }
                        ctl = control_rx.recv() => {
                            match ctl {
                                Some(BusControl::Deliver(json)) => {
                                    if socket.send(Message::Text(json.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Some(BusControl::Drop) => break,
                                None => return,
                            }
                        }
                    }
                }

                let _ = seen_tx.send(BusSeen::Disconnected);
            }
        });

        MockBus {
            url: format!("ws://{addr}"),
            seen,
            control,
        }
    }

    /// Push a delivery frame to the bridge.
    pub fn deliver(&self, channel: &str, payload: &str) {
        let json = format!(r#"{{"op":"deliver","channel":"{channel}","payload":{payload}}}"#);
        let _ = self.control.send(BusControl::Deliver(json));
    }

    /// Sever the current connection, forcing the bridge to reconnect.
    pub fn sever(&self) {
        let _ = self.control.send(BusControl::Drop);
    }

    pub async fn expect_event(&mut self) -> BusSeen {
        tokio::time::timeout(WAIT, self.seen.recv())
            .await
            .expect("timed out waiting for bus event")
            .expect("mock bus closed")
    }

    /// Wait for the next frame, skipping connection markers.
    pub async fn next_frame(&mut self) -> BusFrame {
        loop {
            if let BusSeen::Frame(frame) = self.expect_event().await {
                return frame;
            }
        }
    }

    pub async fn expect_connected(&mut self) {
        loop {
            if matches!(self.expect_event().await, BusSeen::Connected) {
                return;
            }
        }
    }
}

/// Bridge config tuned for tests: fast reconnects, generous failure budget.
pub fn test_config(bus_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.debug = true;
    config.bus.url = bus_url.to_string();
    config.bus.reconnect_initial_ms = 20;
    config.bus.reconnect_cap_ms = 100;
    config.bus.max_failures = 50;
    config
}

pub fn default_views() -> ViewRegistry {
    ViewRegistry::builder()
        .register("ping", Arc::new(PingView))
        .build()
}

/// Wire up the application without starting the bus manager or a listener.
pub fn build_app(config: AppConfig, views: ViewRegistry) -> (Router, AppState, BusManager) {
    let sessions = Arc::new(MemorySessionStore::new());
    let (bus, manager) = BusManager::new(config.bus.clone());
    let registry = Arc::new(ConnectionRegistry::new(bus.clone()));

    let state = AppState::new(registry, bus, sessions, views, config);
    let router = create_router(state.clone());
    (router, state, manager)
}

/// A bridge listening on an ephemeral port with a running bus manager.
pub struct TestBridge {
    pub addr: SocketAddr,
    pub state: AppState,
}

pub async fn start_bridge(config: AppConfig) -> TestBridge {
    let (router, state, manager) = build_app(config, default_views());
    tokio::spawn(manager.run(state.registry.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestBridge { addr, state }
}

pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a client connection to the bridge's duplex endpoint, optionally
/// presenting a session cookie.
pub async fn connect_client(addr: SocketAddr, cookie: Option<&str>) -> ClientSocket {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;
    use tokio_tungstenite::tungstenite::http::header::COOKIE;

    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    if let Some(session_id) = cookie {
        request.headers_mut().insert(
            COOKIE,
            HeaderValue::from_str(&format!("fg_sess={session_id}")).unwrap(),
        );
    }
    let (socket, _) = connect_async(request).await.expect("client connect");
    socket
}

pub async fn send_text(socket: &mut ClientSocket, text: &str) {
    socket
        .send(Message::Text(text.to_string().into()))
        .await
        .expect("send client frame");
}

/// Next text frame from the bridge, or `None` once the connection closes.
pub async fn next_text(socket: &mut ClientSocket) -> Option<String> {
    loop {
        let msg = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for client frame")?;
        match msg {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

pub async fn close_client(mut socket: ClientSocket) {
    let _ = socket.close(None).await;
}
