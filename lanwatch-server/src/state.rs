//! Shared application state

use std::sync::Arc;

use lanwatch_core::{RateLimitRule, SlidingWindowLimiter};

use crate::config::DashboardConfig;
use crate::db::DatabaseManager;

/// Everything handlers share. Built once in the composition root and
/// handed to the router behind an `Arc`.
pub struct AppState {
    pub db: Arc<DatabaseManager>,
    pub limiter: Arc<SlidingWindowLimiter>,
    /// Applied to every `/api` route.
    pub api_rule: RateLimitRule,
}

impl AppState {
    pub fn new(db: DatabaseManager, api_rule: RateLimitRule) -> Self {
        Self {
            db: Arc::new(db),
            limiter: Arc::new(SlidingWindowLimiter::new()),
            api_rule,
        }
    }

    /// Open the configured database. Connections are created lazily, so this
    /// does not touch the file yet.
    pub fn from_config(config: &DashboardConfig, api_rule: RateLimitRule) -> Self {
        let db = DatabaseManager::sqlite(
            &config.db_path,
            config.pool_config(),
            config.retry_policy(),
        );
        Self::new(db, api_rule)
    }
}
