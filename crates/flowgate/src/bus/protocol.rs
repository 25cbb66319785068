//! Wire frames exchanged with the worker bus.
//!
//! Every per-session channel is multiplexed over the one bus connection.
//! Each WebSocket text message carries exactly one frame; payloads are
//! opaque JSON documents forwarded byte for byte. The channel name is the
//! session identifier itself.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// One frame on the bus connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BusFrame {
    /// Declare a session channel (bridge → bus).
    Open { channel: String },
    /// Retire a session channel (bridge → bus).
    Close { channel: String },
    /// Client traffic for a channel (bridge → bus).
    Publish {
        channel: String,
        payload: Box<RawValue>,
    },
    /// Worker reply for a channel (bus → bridge).
    Deliver {
        channel: String,
        payload: Box<RawValue>,
    },
}

impl BusFrame {
    pub fn channel(&self) -> &str {
        match self {
            BusFrame::Open { channel }
            | BusFrame::Close { channel }
            | BusFrame::Publish { channel, .. }
            | BusFrame::Deliver { channel, .. } => channel,
        }
    }
}
