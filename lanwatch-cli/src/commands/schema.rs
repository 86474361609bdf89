//! Schema inspection command
//!
//! Reports which required tables and views are missing from a dashboard
//! database, optionally creating them first.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use lanwatch_server::db::{DatabaseManager, SchemaReport};
use lanwatch_server::DashboardConfig;

/// Arguments for the schema command
#[derive(Parser, Debug)]
pub struct SchemaArgs {
    /// SQLite database file (default: ~/.lanwatch/dashboard.db)
    #[arg(long, env = "LANWATCH_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Create missing tables, views and indexes before checking
    #[arg(long)]
    pub apply: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Check (and optionally create) the dashboard schema
pub async fn run_schema(args: SchemaArgs) -> Result<()> {
    let mut config = DashboardConfig::from_env();
    if let Some(path) = args.db_path {
        config.db_path = path;
    }
    let db_path = config.db_path.clone();
    let apply = args.apply;

    let report = tokio::task::spawn_blocking(move || {
        let db = DatabaseManager::sqlite(
            &config.db_path,
            config.pool_config(),
            config.retry_policy(),
        );
        if apply {
            db.apply_schema()?;
        }
        let report = db.validate_schema();
        db.shutdown();
        report
    })
    .await
    .context("Schema check panicked")?
    .with_context(|| format!("Failed to inspect {}", db_path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&db_path, &report);
    }

    if !report.valid {
        anyhow::bail!("schema incomplete: {} object(s) missing", report.missing.len());
    }
    Ok(())
}

fn print_report(db_path: &std::path::Path, report: &SchemaReport) {
    println!("database: {}", db_path.display());
    if report.valid {
        println!("schema:   ok");
        return;
    }
    println!("schema:   incomplete");
    for missing in &report.missing {
        println!("  missing {missing}");
    }
}
