//! Durable bus connection and per-session channel lifecycle.
//!
//! The manager task owns the one WebSocket connection to the worker cluster.
//! Everything else talks to it through a cheap [`BusHandle`]: channel opens
//! and closes from the registry, publishes from the inbound router. The task
//! feeds deliveries straight into the outbound dispatcher.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::value::RawValue;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::config::BusSettings;
use crate::dispatch;
use crate::registry::ConnectionRegistry;

use super::BusError;
use super::protocol::BusFrame;

/// Connection lifecycle of the bus manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect budget exhausted; the bridge refuses new registrations.
    Fatal,
}

/// Commands accepted by the manager task.
#[derive(Debug)]
pub(crate) enum BusCommand {
    OpenChannel(String),
    CloseChannel(String),
    Publish {
        channel: String,
        payload: Box<RawValue>,
    },
}

type BusSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type BusSink = SplitSink<BusSocket, Message>;

/// Cheap handle for submitting bus operations.
///
/// Sends are fire-and-forget: commands queue through the manager task, which
/// serializes all traffic on the one connection. Per-session ordering is
/// preserved because there is a single queue.
#[derive(Clone)]
pub struct BusHandle {
    command_tx: mpsc::UnboundedSender<BusCommand>,
    state_rx: watch::Receiver<BusState>,
}

impl BusHandle {
    /// Declare the channel for a session.
    pub fn open_channel(&self, session_id: &str) {
        let _ = self
            .command_tx
            .send(BusCommand::OpenChannel(session_id.to_string()));
    }

    /// Retire the channel for a session.
    pub fn close_channel(&self, session_id: &str) {
        let _ = self
            .command_tx
            .send(BusCommand::CloseChannel(session_id.to_string()));
    }

    /// Queue a payload for a session's channel.
    pub fn publish(&self, session_id: &str, payload: Box<RawValue>) {
        let _ = self.command_tx.send(BusCommand::Publish {
            channel: session_id.to_string(),
            payload,
        });
    }

    pub fn state(&self) -> BusState {
        *self.state_rx.borrow()
    }

    pub fn is_fatal(&self) -> bool {
        self.state() == BusState::Fatal
    }

    /// Wait until the manager reaches `target`.
    pub async fn wait_for_state(&self, target: BusState) {
        let mut rx = self.state_rx.clone();
        loop {
            if *rx.borrow() == target {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owns the durable bus connection for the process lifetime.
pub struct BusManager {
    settings: BusSettings,
    command_rx: mpsc::UnboundedReceiver<BusCommand>,
    state_tx: watch::Sender<BusState>,
}

impl BusManager {
    /// Create the manager and its handle. Nothing happens until
    /// [`BusManager::run`] is spawned.
    pub fn new(settings: BusSettings) -> (BusHandle, BusManager) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(BusState::Disconnected);
        (
            BusHandle {
                command_tx,
                state_rx,
            },
            BusManager {
                settings,
                command_rx,
                state_tx,
            },
        )
    }

    /// Drive the connection until the process ends or the reconnect budget
    /// runs out.
    ///
    /// The registry is consulted on every (re)connect to declare channels
    /// for the sessions that are still live. Channel state on the wire does
    /// not survive a connection loss; a session whose channel is not
    /// re-declared would be silently orphaned.
    pub async fn run(mut self, registry: Arc<ConnectionRegistry>) {
        let mut reconnecting = false;
        loop {
            self.set_state(if reconnecting {
                BusState::Reconnecting
            } else {
                BusState::Connecting
            });

            let socket = match self.connect_with_backoff().await {
                Ok(socket) => socket,
                Err(err) => {
                    self.set_state(BusState::Fatal);
                    error!(%err, "refusing new registrations");
                    return;
                }
            };

            self.set_state(BusState::Connected);
            info!(url = %self.settings.url, "bus connection established");

            self.drive(socket, &registry).await;

            reconnecting = true;
            warn!("bus connection lost; reconnecting");
        }
    }

    fn set_state(&self, state: BusState) {
        self.state_tx.send_replace(state);
    }

    /// Dial until connected or the consecutive-failure budget runs out.
    async fn connect_with_backoff(&self) -> Result<BusSocket, BusError> {
        let mut failures: u32 = 0;
        loop {
            match connect_async(self.settings.url.as_str()).await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    failures += 1;
                    if failures >= self.settings.max_failures {
                        error!(%err, failures, "bus connect failed; budget exhausted");
                        return Err(BusError::Fatal);
                    }
                    let delay = self.backoff_delay(failures);
                    debug!(%err, failures, ?delay, "bus connect failed; retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn backoff_delay(&self, failures: u32) -> Duration {
        let base = self.settings.reconnect_initial();
        let cap = self.settings.reconnect_cap();
        let exp = base.saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)));
        let capped = if exp > cap { cap } else { exp };
        let jitter_ms = rand::rng().random_range(0..=(capped.as_millis() as u64) / 4);
        capped + Duration::from_millis(jitter_ms)
    }

    /// Pump one live connection until it fails.
    async fn drive(&mut self, socket: BusSocket, registry: &Arc<ConnectionRegistry>) {
        let (mut sink, mut stream) = socket.split();

        // Resynchronize: declare a channel for every session still
        // registered. `declared` doubles as the dedup set that keeps queued
        // opens from the outage from being replayed on top of the snapshot.
        let mut declared: HashSet<String> = HashSet::new();
        for session_id in registry.session_ids() {
            if declared.insert(session_id.clone()) {
                let frame = BusFrame::Open {
                    channel: session_id,
                };
                if Self::send_frame(&mut sink, &frame).await.is_err() {
                    return;
                }
            }
        }

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else { return };
                    if Self::apply(&mut sink, &mut declared, cmd).await.is_err() {
                        return;
                    }
                }
                msg = stream.next() => {
                    if Self::consume(msg, registry).is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Apply one queued command to the live connection.
    async fn apply(
        sink: &mut BusSink,
        declared: &mut HashSet<String>,
        cmd: BusCommand,
    ) -> Result<(), BusError> {
        match cmd {
            BusCommand::OpenChannel(channel) => {
                if declared.insert(channel.clone()) {
                    Self::send_frame(sink, &BusFrame::Open { channel }).await?;
                }
            }
            BusCommand::CloseChannel(channel) => {
                if declared.remove(&channel) {
                    Self::send_frame(sink, &BusFrame::Close { channel }).await?;
                }
            }
            BusCommand::Publish { channel, payload } => {
                if declared.contains(&channel) {
                    Self::send_frame(sink, &BusFrame::Publish { channel, payload }).await?;
                } else {
                    // The session unregistered while this publish was queued.
                    debug!(%channel, "publish for undeclared channel; dropping");
                }
            }
        }
        Ok(())
    }

    /// Handle one message from the bus. `Err` means the connection is gone.
    fn consume(
        msg: Option<Result<Message, WsError>>,
        registry: &Arc<ConnectionRegistry>,
    ) -> Result<(), ()> {
        match msg {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<BusFrame>(text.as_str()) {
                    Ok(BusFrame::Deliver { channel, payload }) => {
                        dispatch::dispatch(registry, &channel, payload);
                    }
                    Ok(frame) => {
                        warn!(channel = frame.channel(), "unexpected frame from bus; dropping");
                    }
                    Err(err) => {
                        warn!(%err, "undecodable frame from bus; dropping");
                    }
                }
                Ok(())
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(()),
            Some(Ok(Message::Close(_))) | None => Err(()),
            Some(Ok(_)) => Ok(()),
            Some(Err(err)) => {
                warn!(%err, "bus read failure");
                Err(())
            }
        }
    }

    async fn send_frame(sink: &mut BusSink, frame: &BusFrame) -> Result<(), BusError> {
        match serde_json::to_string(frame) {
            Ok(json) => Ok(sink.send(Message::Text(json.into())).await?),
            Err(err) => {
                warn!(%err, "failed to encode bus frame; dropping");
                Ok(())
            }
        }
    }
}

/// Build a handle whose command and state ends are held by the test.
#[cfg(test)]
pub(crate) fn test_handle() -> (
    BusHandle,
    mpsc::UnboundedReceiver<BusCommand>,
    watch::Sender<BusState>,
) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(BusState::Disconnected);
    (
        BusHandle {
            command_tx,
            state_rx,
        },
        command_rx,
        state_tx,
    )
}
