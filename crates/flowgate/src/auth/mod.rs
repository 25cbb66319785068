//! Session authentication.
//!
//! The bridge never owns identity. A client presents an opaque session token
//! (the value of the session cookie) and a [`SessionAuthenticator`] resolves
//! it to an identity or rejects it. A missing token and a rejected token get
//! the same answer at the WebSocket handshake: one error frame, no
//! registration.
//!
//! Token invalidation mid-session is enforced on the synchronous view path
//! only. An already-open duplex connection keeps its registration until it
//! disconnects; revoking a session stops new handshakes and view calls but
//! does not terminate its socket.

mod store;

pub use store::MemorySessionStore;

use async_trait::async_trait;
use thiserror::Error;

/// Authentication failure at a handshake or view boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing session token")]
    MissingToken,

    #[error("unknown session token")]
    Unauthenticated,
}

/// A resolved session identity.
///
/// `session_id` is the cookie value, the registry key and the bus channel
/// name for this session: the same bytes in all three places.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub session_id: String,
    /// Optional user label attached at login.
    pub user: Option<String>,
}

/// Resolves a client-presented token to a session identity.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<SessionIdentity, AuthError>;
}
