//! HTTP surface: synchronous views and the WebSocket upgrade endpoint.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod views;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
