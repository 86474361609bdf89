//! lanwatch CLI - local network monitoring dashboard
//!
//! - `serve`: run the HTTP API (rate limited, keyset paginated)
//! - `schema`: check or create the dashboard database schema

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod tracing_setup;

use commands::schema::SchemaArgs;
use commands::serve::ServeArgs;
use tracing_setup::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "lanwatch",
    author,
    version,
    about = "Local network monitoring dashboard backed by SQLite"
)]
struct Cli {
    /// Debug logging (unless RUST_LOG is set)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dashboard HTTP API
    Serve(ServeArgs),
    /// Check the database schema, optionally creating it
    Schema(SchemaArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env in the working directory, then ~/.lanwatch/.env; neither is required
    dotenvy::dotenv().ok();
    if let Some(home) = dirs::home_dir() {
        dotenvy::from_path(home.join(".lanwatch").join(".env")).ok();
    }

    let cli = Cli::parse();
    init_tracing(&TracingConfig { debug: cli.debug }).ok();

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args).await?,
        Commands::Schema(args) => commands::run_schema(args).await?,
    }

    Ok(())
}
