//! Database layer - pooled SQLite access with retry on lock
//!
//! # Design Principles
//!
//! - One small pool of WAL connections, overflow instead of waiting
//! - Lock errors retried with exponential backoff, everything else surfaced
//! - Writes committed by the manager, reads never
//! - Schema checked once at startup and cached

pub mod connection;
pub mod error;
pub mod manager;
pub mod pool;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ConnectionFactory, DbConnection, QueryResult, SqliteConnection, SqliteFactory};
pub use error::DbError;
pub use manager::{DatabaseManager, RetryPolicy, StatementKind};
pub use pool::{ConnectionPool, PoolConfig, PoolStatus, PooledConnection};
pub use schema::{SchemaContract, SchemaReport, REQUIRED_TABLES, REQUIRED_VIEWS};
