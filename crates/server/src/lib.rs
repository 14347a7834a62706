//! HTTP server for the agent query orchestration core.

pub mod auth;
pub mod error_response;
pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use state::AppState;
