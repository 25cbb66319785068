//! Application configuration.
//!
//! Loaded from a TOML file with `FLOWGATE`-prefixed environment overrides; a
//! default file is written on first run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Debug mode: permissive CORS defaults and detailed error bodies.
    pub debug: bool,
    pub server: ServerConfig,
    pub auth: AuthSettings,
    pub bus: BusSettings,
    pub cors: CorsSettings,
    pub logging: LoggingConfig,
}

/// Listen address for the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9001,
        }
    }
}

/// Session cookie settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Name of the cookie carrying the session identifier.
    pub cookie_name: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            cookie_name: "fg_sess".to_string(),
        }
    }
}

/// Durable bus connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// WebSocket URL of the worker bus.
    pub url: String,
    /// First reconnect delay in milliseconds.
    pub reconnect_initial_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub reconnect_cap_ms: u64,
    /// Consecutive connect failures tolerated before giving up for good.
    pub max_failures: u32,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9100".to_string(),
            reconnect_initial_ms: 250,
            reconnect_cap_ms: 30_000,
            max_failures: 8,
        }
    }
}

impl BusSettings {
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_cap(&self) -> Duration {
        Duration::from_millis(self.reconnect_cap_ms)
    }
}

/// Cross-origin settings for browser clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
