//! Simulated vital monitor entry point.
//!
//! ```text
//! main()
//!  └─ vitals_monitor::start()
//!       ├─ SessionServer  (TCP, one gateway at a time)
//!       └─ Announcer      (UDP broadcast every announce interval)
//! ```

use std::net::IpAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vitals_core::{DeviceId, InvalidDeviceId};
use vitals_monitor::application::config::{
    MonitorConfig, DEFAULT_BROADCAST_PORT, DEFAULT_SESSION_PORT,
};

/// Pretends to be a bedside vital monitor on the LAN.
#[derive(Debug, Parser)]
#[command(name = "vitals-monitor", version)]
struct Cli {
    /// Device id announced to gateways.
    #[arg(long, value_parser = parse_device_id)]
    id: DeviceId,

    /// Address the session server binds and announces.
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// TCP port of the session server.
    #[arg(long, default_value_t = DEFAULT_SESSION_PORT)]
    port: u16,

    /// UDP port gateways listen on.
    #[arg(long, default_value_t = DEFAULT_BROADCAST_PORT)]
    broadcast_port: u16,

    /// Destination address for announcements.
    #[arg(long, default_value = "255.255.255.255")]
    broadcast_addr: IpAddr,

    /// Milliseconds between announcements.
    #[arg(long, default_value_t = 5_000)]
    announce_interval_ms: u64,

    /// Milliseconds between a reading line and its heartbeat byte.
    #[arg(long, default_value_t = 2_000)]
    sample_interval_ms: u64,
}

fn parse_device_id(s: &str) -> Result<DeviceId, InvalidDeviceId> {
    DeviceId::new(s)
}

impl Cli {
    fn into_config(self) -> MonitorConfig {
        MonitorConfig {
            id: self.id,
            address: self.address,
            port: self.port,
            broadcast_addr: self.broadcast_addr,
            broadcast_port: self.broadcast_port,
            announce_interval: Duration::from_millis(self.announce_interval_ms),
            sample_interval: Duration::from_millis(self.sample_interval_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();
    info!("vital monitor {} starting", config.id);

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    let handle = vitals_monitor::start(config, Arc::clone(&running))
        .await
        .context("failed to start monitor")?;
    info!(
        "monitor {} serving on {}.  Press Ctrl-C to exit.",
        handle.identity.id, handle.session_addr
    );

    handle.join().await;
    info!("vital monitor stopped");
    Ok(())
}
