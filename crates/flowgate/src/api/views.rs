//! Synchronous view dispatch.
//!
//! Views are resolved through a registry built once at startup: route
//! identifier → handler object. There is no per-request path lookup and no
//! dynamic import; an unknown name is a 404 at dispatch time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::error::ApiResult;
use crate::auth::SessionIdentity;

/// One synchronous request as seen by a view.
#[derive(Debug, Clone)]
pub struct ViewRequest {
    /// Resolved identity, when the caller presented a valid cookie.
    pub identity: Option<SessionIdentity>,
    /// Decoded request body; `{}` when the body was empty.
    pub body: Value,
}

/// A named request/response view.
#[async_trait]
pub trait ViewHandler: Send + Sync {
    /// Anonymous views skip the authentication check.
    fn anonymous(&self) -> bool {
        false
    }

    async fn call(&self, req: ViewRequest) -> ApiResult<Value>;
}

/// Startup-built map from view name to handler.
#[derive(Default)]
pub struct ViewRegistry {
    views: HashMap<String, Arc<dyn ViewHandler>>,
}

impl ViewRegistry {
    pub fn builder() -> ViewRegistryBuilder {
        ViewRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ViewHandler>> {
        self.views.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }
}

#[derive(Default)]
pub struct ViewRegistryBuilder {
    views: HashMap<String, Arc<dyn ViewHandler>>,
}

impl ViewRegistryBuilder {
    pub fn register(mut self, name: impl Into<String>, handler: Arc<dyn ViewHandler>) -> Self {
        self.views.insert(name.into(), handler);
        self
    }

    pub fn build(self) -> ViewRegistry {
        ViewRegistry { views: self.views }
    }
}

/// Liveness echo for authenticated clients.
pub struct PingView;

#[async_trait]
impl ViewHandler for PingView {
    async fn call(&self, _req: ViewRequest) -> ApiResult<Value> {
        Ok(serde_json::json!({ "pong": true }))
    }
}
