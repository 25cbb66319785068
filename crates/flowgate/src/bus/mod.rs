//! Bus connection management.
//!
//! One durable WebSocket connection to the worker cluster carries every
//! per-session channel. The manager owns the connection for the process
//! lifetime and recovers it without losing registry state.

mod manager;
mod protocol;

pub use manager::{BusHandle, BusManager, BusState};
pub use protocol::BusFrame;

#[cfg(test)]
pub(crate) use manager::{BusCommand, test_handle};

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Bus-side failures.
#[derive(Debug, Error)]
pub enum BusError {
    /// Transport failure on the durable connection. Recovered by the
    /// reconnect state machine; never surfaced to a client.
    #[error("bus connectivity failure: {0}")]
    Connectivity(#[from] tungstenite::Error),

    /// The reconnect budget is exhausted. No new registrations are accepted
    /// until the process restarts.
    #[error("bus reconnect budget exhausted")]
    Fatal,
}
