//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::{MemorySessionStore, SessionAuthenticator};
use crate::bus::BusHandle;
use crate::config::AppConfig;
use crate::registry::ConnectionRegistry;

use super::views::ViewRegistry;

/// Application state shared across all handlers.
///
/// Everything here is constructed once at startup and injected; there are no
/// ambient globals anywhere in the bridge.
#[derive(Clone)]
pub struct AppState {
    /// Live-session registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Handle to the bus connection manager.
    pub bus: BusHandle,
    /// Session store backing the login and logout endpoints.
    pub sessions: Arc<MemorySessionStore>,
    /// Token resolution used at the WebSocket handshake and on every view
    /// call. Defaults to `sessions`; an external session store can be
    /// swapped in with [`AppState::with_authenticator`].
    pub authenticator: Arc<dyn SessionAuthenticator>,
    /// Startup-built view dispatch table.
    pub views: Arc<ViewRegistry>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        bus: BusHandle,
        sessions: Arc<MemorySessionStore>,
        views: ViewRegistry,
        config: AppConfig,
    ) -> Self {
        let authenticator: Arc<dyn SessionAuthenticator> = sessions.clone();
        Self {
            registry,
            bus,
            sessions,
            authenticator,
            views: Arc::new(views),
            config: Arc::new(config),
        }
    }

    /// Swap in an external authenticator.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn SessionAuthenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }
}
