//! UDP broadcast-based monitor discovery.
//!
//! The gateway binds a UDP socket on the discovery port (default 6000) and
//! listens for announcement datagrams broadcast by monitors.  On receiving a
//! valid announcement it:
//!
//! 1. Decodes the monitor identity from the payload.
//! 2. Admits the identity into the [`DiscoveryState`] if its id is unknown.
//! 3. Emits [`GatewayEvent::DeviceDiscovered`] for new ids.
//!
//! Announcements from an id that is already known are dropped silently, so a
//! monitor may announce as often as it likes.
//!
//! # How UDP discovery works (for beginners)
//!
//! UDP is a connectionless protocol: no delivery guarantee, no ordering, no
//! duplicate suppression.  That suits discovery well:
//!
//! 1. A monitor sends a datagram to the LAN broadcast address on the
//!    discovery port.  Every host on the LAN receives it.
//! 2. The gateway is listening on that port and decodes the identity inside.
//! 3. The gateway then opens a TCP session to the advertised `address:port`.
//!    Nothing is sent back over UDP.
//!
//! # Receive timeout
//!
//! Each receive waits at most 500 ms.  On every timeout the loop checks the
//! `running` flag and exits cleanly when the gateway is shutting down.
//!
//! [`DiscoveryState`]: crate::application::discovery_state::DiscoveryState

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use vitals_core::protocol::announce::MAX_ANNOUNCE_SIZE;
use vitals_core::{decode_announce, AnnounceError};

use crate::application::discovery_state::Admission;
use crate::application::state::{GatewayEvent, SharedState};

/// How long one receive waits before re-checking the running flag.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Error type for discovery listener operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred while receiving a datagram.
    #[error("recv error: {0}")]
    Recv(std::io::Error),
}

/// Handles one received datagram.
///
/// Decodes the announcement and, if the id is unknown, admits it as a new
/// pending discovery.  The discovery lock is held only for the admission
/// itself.
///
/// # Errors
///
/// Returns the [`AnnounceError`] for malformed payloads; nothing is admitted.
pub async fn on_packet(state: &SharedState, raw: &[u8]) -> Result<Admission, AnnounceError> {
    let identity = decode_announce(raw)?;

    let admission = state.discovery.lock().await.admit(identity.clone());
    match admission {
        Admission::Admitted => {
            info!("discovered monitor {identity}");
            state.emit(GatewayEvent::DeviceDiscovered { identity });
        }
        Admission::Duplicate(current) => {
            debug!("ignoring announcement from {} ({current})", identity.id);
        }
    }
    Ok(admission)
}

/// The bound discovery socket plus the state it admits into.
pub struct DiscoveryListener {
    socket: UdpSocket,
    state: SharedState,
}

impl DiscoveryListener {
    /// Binds the discovery socket with broadcast reception enabled.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::BindFailed`] if the address is in use or
    /// the socket options cannot be set.
    pub async fn bind(addr: SocketAddr, state: SharedState) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| DiscoveryError::BindFailed { addr, source })?;
        socket
            .set_broadcast(true)
            .map_err(|source| DiscoveryError::BindFailed { addr, source })?;
        Ok(Self { socket, state })
    }

    /// The address actually bound (useful when binding port 0).
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Recv`] if the OS cannot report the address.
    pub fn local_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        self.socket.local_addr().map_err(DiscoveryError::Recv)
    }

    /// Receives announcements until `running` is cleared.
    ///
    /// Receive errors and malformed datagrams are logged and skipped; the
    /// loop itself never fails.
    pub async fn run(self, running: Arc<AtomicBool>) {
        // One spare byte so an oversized datagram is seen as oversized
        // instead of being silently truncated to a valid length.
        let mut buf = vec![0u8; MAX_ANNOUNCE_SIZE + 1];
        match self.socket.local_addr() {
            Ok(addr) => info!("discovery listener on UDP {addr}"),
            Err(_) => info!("discovery listener started"),
        }

        while running.load(Ordering::Relaxed) {
            let received =
                tokio::time::timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buf)).await;
            match received {
                Err(_elapsed) => continue,
                Ok(Err(e)) => {
                    warn!("{}", DiscoveryError::Recv(e));
                }
                Ok(Ok((len, from))) => {
                    if let Err(e) = on_packet(&self.state, &buf[..len]).await {
                        debug!("discarding datagram from {from}: {e}");
                    }
                }
            }
        }
        info!("discovery listener stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
