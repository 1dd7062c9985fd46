//! Quorum auth server binary.
//!
//! ```bash
//! # Run with defaults (in-tree SQLite file, mail logged instead of sent)
//! QUORUM_SESSION_SECRET=change-me quorum
//!
//! # Run against a config file, overriding the bind address
//! quorum --config quorum.toml --host 127.0.0.1 --port 8080
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use quorum::config::Config;
use quorum::gateway;

#[derive(Parser)]
#[command(name = "quorum", version, about = "Credential and session backend for Quorum decision rooms")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Interface to bind, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the config file.
    #[arg(long, short = 'p')]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quorum=info")),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    let host = config.server.host.clone();
    let port = config.server.port;
    gateway::run_gateway(&host, port, config).await
}
