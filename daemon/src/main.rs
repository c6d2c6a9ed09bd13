//! Meeting scheduler daemon
//!
//! Serves teachers and students over the `COMMAND||TOKEN||DATA` line protocol.

use anyhow::Result;
use clap::Parser;
use meeting_daemon::{Config, Server, open_backend};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Meeting scheduler daemon
#[derive(Parser, Debug)]
#[command(name = "meetingd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Meeting daemon v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            let config = Config::load(path).await?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let backend = open_backend(&config.storage)?;
    let server = Server::bind(&config, backend).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // keep the sender alive, a dropped sender also stops the server
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl-C, stopping");
        let _ = shutdown_tx.send(true);
    });

    server.run(shutdown_rx).await?;
    info!("Daemon stopped");
    Ok(())
}
