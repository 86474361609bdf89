//! Dashboard configuration - database and admission control settings
//!
//! Configuration is loaded from environment variables:
//! - `LANWATCH_DB_PATH`: SQLite file (default: ~/.lanwatch/dashboard.db)
//! - `LANWATCH_POOL_SIZE`: pooled connections (default: 5)
//! - `LANWATCH_ACQUIRE_TIMEOUT_MS`: SQLite busy timeout (default: 5000)
//! - `LANWATCH_MAX_RETRIES`: retries on a locked database (default: 3)
//! - `LANWATCH_RATE_LIMIT`: requests per client per window (default: 60)
//! - `LANWATCH_RATE_WINDOW_SECS`: rate limit window (default: 60)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use lanwatch_core::{RateLimitRule, ValidationError};

use crate::db::{PoolConfig, RetryPolicy};

pub const DEFAULT_RATE_LIMIT: u32 = 60;
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Dashboard configuration
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub db_path: PathBuf,
    pub pool_size: usize,
    pub acquire_timeout: Duration,
    pub max_retries: u32,
    pub rate_limit: u32,
    pub rate_window: Duration,
}

impl DashboardConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup. Unparseable values fall
    /// back to the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            db_path: lookup("LANWATCH_DB_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            pool_size: parse_or(&lookup, "LANWATCH_POOL_SIZE", defaults.pool_size),
            acquire_timeout: Duration::from_millis(parse_or(
                &lookup,
                "LANWATCH_ACQUIRE_TIMEOUT_MS",
                defaults.acquire_timeout.as_millis() as u64,
            )),
            max_retries: parse_or(&lookup, "LANWATCH_MAX_RETRIES", defaults.max_retries),
            rate_limit: parse_or(&lookup, "LANWATCH_RATE_LIMIT", defaults.rate_limit),
            rate_window: Duration::from_secs(parse_or(
                &lookup,
                "LANWATCH_RATE_WINDOW_SECS",
                defaults.rate_window.as_secs(),
            )),
        }
    }

    /// Create config with explicit database path (for testing)
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.pool_size,
            acquire_timeout: self.acquire_timeout,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }

    /// Rule for the `/api` routes. Zero limit or window is rejected.
    pub fn rate_limit_rule(&self) -> Result<RateLimitRule, ValidationError> {
        RateLimitRule::new(self.rate_limit, self.rate_window)
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            db_path: default_db_path(),
            pool_size: pool.max_connections,
            acquire_timeout: pool.acquire_timeout,
            max_retries: RetryPolicy::default().max_retries,
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: DEFAULT_RATE_WINDOW,
        }
    }
}

/// `~/.lanwatch/dashboard.db`, or relative to the working directory when
/// there is no home directory.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lanwatch")
        .join("dashboard.db")
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable setting");
                default
            }
        },
        None => default,
    }
}
