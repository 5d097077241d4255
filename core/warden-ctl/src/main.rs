//! warden-ctl: command-line client for the Warden daemon.
//!
//! ## Subcommands
//!
//! - `health`: daemon liveness and version
//! - `status`: current session phase and check bookkeeping
//! - `surfaces`: which UI surfaces are active
//! - `check`: run an auth check now
//! - `get` / `invalidate`: inspect or drop entity cache entries

mod daemon_client;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;
use warden_daemon_protocol::{CacheKind, Method};

#[derive(Parser)]
#[command(name = "warden-ctl")]
#[command(about = "Query and control the Warden daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the daemon is up
    Health,

    /// Show the current session status
    Status,

    /// List active UI surfaces
    Surfaces,

    /// Run an auth check immediately
    Check,

    /// Print a cached entry
    Get {
        /// Cache to read (resources or folders)
        #[arg(value_name = "CACHE", value_parser = parse_cache_kind)]
        cache: CacheKind,

        /// Entity id
        #[arg(value_name = "KEY")]
        key: String,
    },

    /// Drop one cached entry
    Invalidate {
        /// Cache holding the entry (resources or folders)
        #[arg(value_name = "CACHE", value_parser = parse_cache_kind)]
        cache: CacheKind,

        /// Entity id
        #[arg(value_name = "KEY")]
        key: String,
    },
}

impl Commands {
    fn to_request(&self) -> (Method, Option<Value>) {
        match self {
            Commands::Health => (Method::GetHealth, None),
            Commands::Status => (Method::GetStatus, None),
            Commands::Surfaces => (Method::GetSurfaces, None),
            Commands::Check => (Method::CheckNow, None),
            Commands::Get { cache, key } => (
                Method::CacheGet,
                Some(json!({ "cache": cache.as_str(), "key": key })),
            ),
            Commands::Invalidate { cache, key } => (
                Method::CacheInvalidate,
                Some(json!({ "cache": cache.as_str(), "key": key })),
            ),
        }
    }
}

fn parse_cache_kind(value: &str) -> Result<CacheKind, String> {
    CacheKind::from_str(value)
        .ok_or_else(|| format!("unknown cache '{}' (expected resources or folders)", value))
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (method, params) = cli.command.to_request();

    match daemon_client::call(method, params) {
        Ok(data) => match serde_json::to_string_pretty(&data) {
            Ok(output) => println!("{}", output),
            Err(err) => {
                tracing::error!(error = %err, "Failed to format daemon response");
                std::process::exit(1);
            }
        },
        Err(err) => {
            tracing::error!(error = %err, method = ?method, "warden-ctl request failed");
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    }
}
