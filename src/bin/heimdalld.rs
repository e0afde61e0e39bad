//! heimdalld: comic lookup service with resilient upstream calls.
//!
//! Serves the xkcd routes and the statistic timers over HTTP.

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use heimdall::config::Config;
use heimdall::server;

/// Heimdall daemon.
#[derive(Parser)]
#[command(name = "heimdalld")]
#[command(version)]
#[command(about = "Comic lookup service with circuit breaking and statistic timers")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "HEIMDALL_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: info; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let addr: SocketAddr = config.server.address.parse().map_err(|e| {
        heimdall::HeimdallError::Configuration(format!("Invalid address: {e}"))
    })?;

    let state = server::build_state(&config)?;
    let listener = TcpListener::bind(addr).await?;

    info!(version = env!("CARGO_PKG_VERSION"), %addr, "heimdalld starting");
    server::serve(listener, state).await?;

    Ok(())
}
