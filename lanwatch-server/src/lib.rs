//! lanwatch-server: SQLite data layer and HTTP API for the lanwatch dashboard
//!
//! Database access goes through a small connection pool with retry on
//! lock; the API is rate limited per client and pages through growing
//! tables with keyset cursors.

pub mod config;
pub mod db;
pub mod http;
pub mod state;

pub use config::DashboardConfig;
pub use db::{DatabaseManager, DbError};
pub use http::{build_router, run_server, ServerConfig, ServerError};
pub use state::AppState;
