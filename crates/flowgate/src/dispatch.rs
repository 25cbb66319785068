//! Outbound dispatch: bus deliveries back to client transports.
//!
//! Deliveries are best effort. A reply for a session nobody is connected to
//! is dropped, never buffered; a reply that races a disconnect is dropped
//! and the stale handle cleaned up. Nothing here ever blocks the bus reader.

use serde_json::value::RawValue;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::registry::{ConnectionRegistry, Outbound};

/// What happened to one bus delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// No handle registered for the session.
    DroppedUnknown,
    /// The client disconnected concurrently; the stale handle was
    /// unregistered.
    DroppedClosed,
    /// The client's outbound buffer is full.
    DroppedBacklog,
}

/// Deliver a bus payload to the session's client, or drop it.
pub fn dispatch(
    registry: &ConnectionRegistry,
    session_id: &str,
    payload: Box<RawValue>,
) -> DispatchOutcome {
    let Some(client) = registry.lookup(session_id) else {
        debug!(%session_id, "bus delivery for unregistered session; dropping");
        return DispatchOutcome::DroppedUnknown;
    };

    match client.sender.try_send(Outbound::Frame(payload.get().to_string())) {
        Ok(()) => DispatchOutcome::Delivered,
        Err(TrySendError::Closed(_)) => {
            debug!(%session_id, "client disconnected mid-delivery; unregistering stale handle");
            registry.unregister(session_id, client.conn_id);
            DispatchOutcome::DroppedClosed
        }
        Err(TrySendError::Full(_)) => {
            warn!(%session_id, "client outbound buffer full; dropping delivery");
            DispatchOutcome::DroppedBacklog
        }
    }
}
