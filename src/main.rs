//! pg-ssl-listener
//!
//! Listens for PostgreSQL clients, answers their SSLRequest and terminates
//! TLS on the same port, so a stock TLS stack can serve `sslmode=require`
//! clients.
//!
//! ```text
//!   client ──SSLRequest──▶ ┌──────────┐   ┌──────────────┐   ┌─────┐   ┌────────┐
//!          ◀──── 'S' ───── │ listener │──▶│ SSLRequest   │──▶│ TLS │──▶│ echo   │
//!          ──ClientHello─▶ │ (bounded)│   │ wrapper      │   │     │   │        │
//!                          └──────────┘   └──────────────┘   └─────┘   └────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use pg_ssl_listener::config::{self, AppConfig};
use pg_ssl_listener::net::listener::bind_tcp;
use pg_ssl_listener::observability::{logging, metrics};
use pg_ssl_listener::{Server, Shutdown};

#[derive(Parser)]
#[command(name = "pg-ssl-listener")]
#[command(about = "Answer PostgreSQL SSLRequests in front of a TLS listener", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };

    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("pg-ssl-listener v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = bind_tcp(&config.listener).await?;
    let server = Server::new(config)?;
    if server.config().tls.is_none() {
        tracing::warn!("No [tls] section configured, connections will be echoed in plaintext");
    }

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal.trigger_on_ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
