//! HTTP server command for the lanwatch dashboard API

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use lanwatch_server::{run_server, AppState, DashboardConfig, ServerConfig};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(long, short = 'b', env = "LANWATCH_BIND", default_value = "127.0.0.1:3030")]
    pub bind: SocketAddr,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// SQLite database file (default: ~/.lanwatch/dashboard.db)
    #[arg(long, env = "LANWATCH_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Pooled database connections
    #[arg(long, env = "LANWATCH_POOL_SIZE")]
    pub pool_size: Option<usize>,

    /// Retries when the database is locked
    #[arg(long, env = "LANWATCH_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Requests per client per window on /api routes
    #[arg(long, env = "LANWATCH_RATE_LIMIT")]
    pub rate_limit: Option<u32>,

    /// Rate limit window in seconds
    #[arg(long, env = "LANWATCH_RATE_WINDOW_SECS")]
    pub rate_window_secs: Option<u64>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Do not create missing tables and views at startup
    #[arg(long)]
    pub no_create_schema: bool,
}

impl ServeArgs {
    /// Environment defaults with command-line overrides applied.
    pub fn dashboard_config(&self) -> DashboardConfig {
        let mut config = DashboardConfig::from_env();
        if let Some(path) = &self.db_path {
            config.db_path = path.clone();
        }
        if let Some(size) = self.pool_size {
            config.pool_size = size;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(limit) = self.rate_limit {
            config.rate_limit = limit;
        }
        if let Some(secs) = self.rate_window_secs {
            config.rate_window = Duration::from_secs(secs);
        }
        config
    }
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = args.dashboard_config();
    let rule = config
        .rate_limit_rule()
        .context("Invalid rate limit configuration")?;

    tracing::info!(
        db = %config.db_path.display(),
        pool_size = config.pool_size,
        max_retries = config.max_retries,
        rate_limit = rule.max_requests,
        rate_window_secs = rule.window.as_secs(),
        "Starting lanwatch server on {}",
        args.bind
    );

    let state = Arc::new(AppState::from_config(&config, rule));

    let startup = Arc::clone(&state);
    let create_schema = !args.no_create_schema;
    let report = tokio::task::spawn_blocking(move || {
        if create_schema {
            startup.db.apply_schema()?;
        }
        startup.db.validate_schema()
    })
    .await
    .context("Schema check panicked")?
    .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    if !report.valid {
        tracing::warn!(missing = ?report.missing, "Schema incomplete, /health will report degraded");
    }

    let server = ServerConfig {
        bind_addr: args.bind,
        cors_permissive: args.cors_permissive,
        request_timeout: Duration::from_secs(args.timeout),
    };

    // Run server (blocks until shutdown)
    run_server(state, server).await.context("Server error")?;

    Ok(())
}
