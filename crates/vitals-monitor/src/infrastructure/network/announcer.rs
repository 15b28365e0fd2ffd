//! UDP broadcast announcer.
//!
//! Sends the encoded [`DeviceIdentity`] to the broadcast address every
//! `interval`.  Gateways ignore repeats from an id they already track, so the
//! monitor keeps announcing for as long as it runs; that is how it is found
//! again after a gateway has forgotten it.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use vitals_core::shutdown::pause;
use vitals_core::{encode_announce, DeviceIdentity};

use crate::MonitorError;

pub struct Announcer {
    socket: UdpSocket,
    payload: Vec<u8>,
    target: SocketAddr,
    interval: Duration,
}

impl Announcer {
    /// Encodes `identity` and binds an ephemeral UDP socket with broadcast
    /// enabled.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Announce`] if the identity does not fit the
    /// announcement format and [`MonitorError::Bind`] if no socket can be
    /// opened.
    pub async fn bind(
        identity: &DeviceIdentity,
        target: SocketAddr,
        interval: Duration,
    ) -> Result<Self, MonitorError> {
        let payload = encode_announce(identity)?;
        let local = match target {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| MonitorError::Bind {
                addr: local.to_string(),
                source,
            })?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            payload,
            target,
            interval,
        })
    }

    /// Sends one announcement.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Io`] if the datagram cannot be sent.
    pub async fn announce_once(&self) -> Result<(), MonitorError> {
        self.socket.send_to(&self.payload, self.target).await?;
        debug!("announced to {}", self.target);
        Ok(())
    }

    /// Announces every `interval` until `running` is cleared.  Send failures
    /// are logged and retried on the next tick.
    pub async fn run(self, running: Arc<AtomicBool>) {
        info!("announcing to {} every {:?}", self.target, self.interval);
        loop {
            if let Err(e) = self.announce_once().await {
                warn!("announcement to {} failed: {e}", self.target);
            }
            if !pause(self.interval, &running).await {
                break;
            }
        }
        info!("announcer stopped");
    }
}
