//! Vital monitor gateway entry point.
//!
//! Loads the configuration, initialises logging, starts every component via
//! [`runtime::start`], and runs until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load_config()           -- --config path or platform default
//!  └─ runtime::start()
//!       ├─ DiscoveryListener  (UDP broadcast receive loop)
//!       ├─ Dispatcher         (TCP connect + bounded sample cycles)
//!       ├─ Prober             (liveness sweep)
//!       └─ Cleaner            (purges disconnected ids)
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vitals_gateway::infrastructure::network::connector::TcpConnector;
use vitals_gateway::infrastructure::sink::StdoutSink;
use vitals_gateway::infrastructure::storage::config::{load_config, save_config, GatewayConfig};
use vitals_gateway::runtime;

/// Discovers vital monitors on the LAN and streams their readings to stdout.
#[derive(Debug, Parser)]
#[command(name = "vitals-gateway", version)]
struct Cli {
    /// Path to the TOML config file (defaults to the platform config dir).
    #[arg(long, env = "VITALS_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override `network.discovery_port` from the config file.
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Write a default config file to the config path and exit.
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.write_default_config {
        let path = save_config(&GatewayConfig::default(), cli.config.as_deref())
            .context("failed to write default config")?;
        println!("wrote default config to {}", path.display());
        return Ok(());
    }

    let mut config = load_config(cli.config.as_deref()).context("failed to load config")?;
    if let Some(port) = cli.discovery_port {
        config.network.discovery_port = port;
    }

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    let level = config.gateway.log_level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("vital monitor gateway starting");

    // Shutdown flag shared across all components.
    let running = Arc::new(AtomicBool::new(true));

    let handle = runtime::start(
        &config,
        Arc::new(TcpConnector::new()),
        Arc::new(StdoutSink::new()),
        Arc::clone(&running),
    )
    .await
    .context("failed to start gateway")?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!(
        "gateway ready on UDP {}.  Press Ctrl-C to exit.",
        handle.discovery_addr
    );

    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    // Sample cycles blocked on silent monitors are not waited for.
    handle.abort();
    info!("vital monitor gateway stopped");
    Ok(())
}
