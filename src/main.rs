//! Serve folders of delimited files as dashboard-queryable timeseries metrics.
//!
//! Point the binary at a data root; each subdirectory is a dashboard-visible
//! folder, and every delimited file in a folder becomes a queryable source
//! with sniffed dialect, an auto-detected date index, and a catalog of
//! derived portfolio metrics.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use csv_datasource::annotations::AnnotationRegistry;
use csv_datasource::query::QueryHandler;
use csv_datasource::server::{run_server, AppState, ServerConfig};

/// Delimited-file dashboard datasource
#[derive(Parser, Debug, Clone)]
#[command(name = "csv-datasource")]
#[command(about = "Serve folders of delimited files as dashboard metrics")]
struct Args {
    /// Address to bind
    #[arg(short, long, default_value = "0.0.0.0")]
    addr: String,

    /// Port to listen on
    #[arg(short, long, default_value = "3003")]
    port: u16,

    /// Data root; each subdirectory is a dashboard-visible folder
    #[arg(short, long, default_value = "./", env = "DATA_FOLDER")]
    folder: PathBuf,

    /// Log at debug level when RUST_LOG is unset
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG takes precedence, fallback to the verbosity flag
    let fallback = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .init();

    let root = args
        .folder
        .canonicalize()
        .with_context(|| format!("data root {} is not accessible", args.folder.display()))?;

    tracing::info!(
        addr = %args.addr,
        port = args.port,
        root = %root.display(),
        "Starting csv-datasource"
    );

    let state = Arc::new(AppState {
        handler: QueryHandler::new(root),
        annotations: AnnotationRegistry::new(),
    });

    run_server(
        state,
        ServerConfig {
            addr: args.addr,
            port: args.port,
        },
    )
    .await
}
