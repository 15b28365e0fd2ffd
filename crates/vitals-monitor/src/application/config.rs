//! Runtime configuration of one simulated monitor.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use vitals_core::{host_port, DeviceId};

/// UDP port gateways listen on for announcements.
pub const DEFAULT_BROADCAST_PORT: u16 = 6000;

/// TCP port the session server listens on unless told otherwise.
pub const DEFAULT_SESSION_PORT: u16 = 5000;

/// Pause between two announcements.
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(5);

/// Pause between a reading line and its heartbeat byte.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Who the monitor is, where it listens, and where it announces itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Id advertised to gateways and repeated in every reading.
    pub id: DeviceId,
    /// Address the session server binds and advertises.
    pub address: String,
    /// Session server port; 0 lets the OS pick one.
    pub port: u16,
    /// Destination address of announcements.
    pub broadcast_addr: IpAddr,
    /// Destination port of announcements.
    pub broadcast_port: u16,
    pub announce_interval: Duration,
    pub sample_interval: Duration,
}

impl MonitorConfig {
    /// A config for `id` listening on `127.0.0.1` with every other value at
    /// its default.
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            address: Ipv4Addr::LOCALHOST.to_string(),
            port: DEFAULT_SESSION_PORT,
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            broadcast_port: DEFAULT_BROADCAST_PORT,
            announce_interval: DEFAULT_ANNOUNCE_INTERVAL,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    /// Where announcements are sent.
    pub fn announce_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_addr, self.broadcast_port)
    }

    /// `address:port` for the session server, IPv6 literals bracketed.
    pub fn session_bind_addr(&self) -> String {
        host_port(&self.address, self.port)
    }
}
