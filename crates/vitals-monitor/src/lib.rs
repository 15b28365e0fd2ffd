//! vitals-monitor library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the simulated monitor do? (for beginners)
//!
//! A real bedside monitor is a device on the hospital LAN.  This crate plays
//! one in software so the gateway can be exercised end to end:
//!
//! 1. It opens a TCP server on its configured `address:port`.
//! 2. It broadcasts its identity (id, address, port) over UDP every few
//!    seconds so gateways on the LAN can find it.
//! 3. When a gateway connects it sends one reading line, waits, sends one
//!    heartbeat byte, and repeats until the gateway goes away.  Then it
//!    waits for the next gateway connection.

/// Application layer: monitor configuration and the per-connection reading
/// loop.
pub mod application;

/// Infrastructure layer: UDP announcer, TCP session server, retry backoff.
pub mod infrastructure;

use std::net::SocketAddr;
use std::sync::{atomic::AtomicBool, Arc};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;
use vitals_core::{AnnounceError, DeviceIdentity};

use application::config::MonitorConfig;
use infrastructure::backoff::Backoff;
use infrastructure::network::announcer::Announcer;
use infrastructure::network::server::SessionServer;

/// Errors the simulated monitor can report.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error on an established socket.
    #[error("monitor I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The identity cannot be encoded as an announcement.
    #[error("cannot announce identity: {0}")]
    Announce(#[from] AnnounceError),
    /// Start-up was cancelled by clearing the running flag.
    #[error("monitor stopped before it was ready")]
    Stopped,
}

/// A running simulated monitor.
pub struct MonitorHandle {
    /// The identity being announced; its port is the one actually bound.
    pub identity: DeviceIdentity,
    /// Address the session server listens on.
    pub session_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Waits for the announcer and server loops to exit.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }

    /// Stops the monitor at once, closing any gateway connection.
    pub fn abort(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Binds the session server, then starts announcing it.
///
/// The server is bound first so the announcement carries the real port
/// when `config.port` is 0.
///
/// # Errors
///
/// Returns [`MonitorError::Stopped`] if `running` is cleared while binding
/// is still being retried, and [`MonitorError::Announce`] or
/// [`MonitorError::Bind`] if the announcer cannot be set up.
pub async fn start(
    config: MonitorConfig,
    running: Arc<AtomicBool>,
) -> Result<MonitorHandle, MonitorError> {
    let mut backoff = Backoff::default();
    let server = SessionServer::bind_with_retry(&config, &mut backoff, &running).await?;
    let session_addr = server.local_addr()?;

    let identity = DeviceIdentity::new(
        config.id.clone(),
        config.address.clone(),
        session_addr.port(),
    );
    let announcer =
        Announcer::bind(&identity, config.announce_target(), config.announce_interval).await?;

    let tasks = vec![
        tokio::spawn(server.run(Arc::clone(&running))),
        tokio::spawn(announcer.run(Arc::clone(&running))),
    ];
    info!("monitor {identity} started");
    Ok(MonitorHandle {
        identity,
        session_addr,
        tasks,
    })
}
