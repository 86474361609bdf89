//! HTTP server layer
//!
//! Axum server with:
//! - CORS (localhost only by default)
//! - Request tracing
//! - Per-client rate limiting on the API routes
//! - Graceful shutdown
//! - JSON error responses

pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, run_server, ServerConfig, ServerError};
