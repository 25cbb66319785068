//! Inbound routing: client frames onto the bus.

use serde_json::value::RawValue;
use thiserror::Error;

use crate::bus::BusHandle;
use crate::registry::ConnectionRegistry;

/// Why an inbound frame was dropped. The connection always survives; callers
/// log the reason and move on.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Frame for a session that is not (or no longer) registered.
    #[error("session {0} is not registered")]
    UnknownSession(String),

    /// Frame body is not one well-formed JSON document.
    #[error("undecodable payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Forward one client frame to the session's bus channel, fire-and-forget.
///
/// Replies come back asynchronously through the outbound dispatcher; nothing
/// here waits on the bus. Frames for a single session reach the bus in the
/// order they were received.
pub fn route(
    registry: &ConnectionRegistry,
    bus: &BusHandle,
    session_id: &str,
    raw: &str,
) -> Result<(), RouteError> {
    if !registry.contains(session_id) {
        return Err(RouteError::UnknownSession(session_id.to_string()));
    }
    let payload = RawValue::from_string(raw.to_string())?;
    bus.publish(session_id, payload);
    Ok(())
}
