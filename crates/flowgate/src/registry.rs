//! Connection registry: the single source of truth for which sessions are
//! reachable right now.
//!
//! The registry is process-scoped state built at startup and injected through
//! [`crate::api::AppState`]; nothing in the crate reaches for it as a global.
//! Bus channel lifecycle brackets registry membership: a channel is opened
//! once its handle is mapped and closed before the mapping goes away, so a
//! channel never outlives its handle and is never created before it.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bus::BusHandle;

/// Per-connection outbound buffer. A client that falls this far behind
/// starts losing frames rather than stalling the bus reader.
pub const OUTBOUND_BUFFER: usize = 64;

/// Frames pushed to a client connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One JSON document to deliver to the client.
    Frame(String),
    /// Server-initiated close; sent to a handle evicted by a newer
    /// registration for the same session.
    Close,
}

/// Sender half of a connection's outbound queue.
pub type ClientSender = mpsc::Sender<Outbound>;

/// A registered connection as seen by lookups.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    /// Identifies this particular handle across register/unregister races.
    pub conn_id: u64,
    pub sender: ClientSender,
}

/// Registration refusal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    /// The bus manager gave up reconnecting. The bridge no longer accepts
    /// new sessions; existing ones stay connected but undeliverable.
    #[error("bus connection is down for good; not accepting new sessions")]
    BusUnavailable,
}

/// In-memory map from session id to the one live connection handle.
pub struct ConnectionRegistry {
    connections: DashMap<String, RegisteredClient>,
    next_conn_id: AtomicU64,
    bus: BusHandle,
}

impl ConnectionRegistry {
    pub fn new(bus: BusHandle) -> Self {
        Self {
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
            bus,
        }
    }

    /// Register a connection for a session, evicting any previous handle.
    ///
    /// The evicted handle (if any) is told to close, so at most one live
    /// handle exists per session id. The session's bus channel is opened
    /// once the mapping is in place. Returns the connection id to pass back
    /// to [`ConnectionRegistry::unregister`].
    pub fn register(
        &self,
        session_id: &str,
        sender: ClientSender,
    ) -> Result<u64, RegisterError> {
        if self.bus.is_fatal() {
            return Err(RegisterError::BusUnavailable);
        }

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let client = RegisteredClient { conn_id, sender };
        let previous = match self.connections.entry(session_id.to_string()) {
            Entry::Occupied(mut entry) => Some(entry.insert(client)),
            Entry::Vacant(entry) => {
                entry.insert(client);
                None
            }
        };

        if let Some(old) = previous {
            debug!(%session_id, old_conn = old.conn_id, "evicting stale connection");
            let _ = old.sender.try_send(Outbound::Close);
        }

        self.bus.open_channel(session_id);
        info!(%session_id, conn_id, "registered client connection");
        Ok(conn_id)
    }

    /// Remove a session's mapping if `conn_id` still owns it.
    ///
    /// Idempotent: an evicted or already-removed connection calling in with
    /// its stale id leaves the current registration untouched. The bus
    /// channel is closed before the mapping is removed.
    pub fn unregister(&self, session_id: &str, conn_id: u64) {
        if let Entry::Occupied(entry) = self.connections.entry(session_id.to_string()) {
            if entry.get().conn_id == conn_id {
                self.bus.close_channel(session_id);
                entry.remove();
                info!(%session_id, conn_id, "unregistered client connection");
            }
        }
    }

    /// O(1) lookup of the live handle for a session.
    pub fn lookup(&self, session_id: &str) -> Option<RegisteredClient> {
        self.connections.get(session_id).map(|c| c.clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.connections.contains_key(session_id)
    }

    /// Snapshot of registered session ids, taken by the bus manager for
    /// reconnect resynchronization.
    pub fn session_ids(&self) -> Vec<String> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
