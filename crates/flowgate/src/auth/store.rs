//! In-memory session store.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{AuthError, SessionAuthenticator, SessionIdentity};

/// In-memory session store keyed by session token.
///
/// The login view mints tokens here. Deployments with an external session
/// store implement [`SessionAuthenticator`] against it instead; identifiers
/// minted elsewhere can be admitted with [`MemorySessionStore::admit`] as
/// long as the cookie value and the admitted identifier match bit for bit.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh session token.
    pub fn issue(&self, user: Option<String>) -> SessionIdentity {
        let session_id = Uuid::new_v4().simple().to_string();
        self.sessions.insert(session_id.clone(), user.clone());
        SessionIdentity { session_id, user }
    }

    /// Admit an externally minted session identifier.
    pub fn admit(&self, session_id: &str, user: Option<String>) {
        self.sessions.insert(session_id.to_string(), user);
    }

    /// Remove a session. Returns whether it existed.
    pub fn revoke(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionAuthenticator for MemorySessionStore {
    async fn resolve(&self, token: &str) -> Result<SessionIdentity, AuthError> {
        match self.sessions.get(token) {
            Some(user) => Ok(SessionIdentity {
                session_id: token.to_string(),
                user: user.clone(),
            }),
            None => Err(AuthError::Unauthenticated),
        }
    }
}
