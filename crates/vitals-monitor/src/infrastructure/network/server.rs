//! TCP session server.
//!
//! Accepts gateway connections one at a time and runs the reading loop on
//! each.  A failed session never stops the server: it logs the reason and
//! goes back to accepting.  Bind and accept failures are retried after a
//! [`Backoff`] delay.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};
use vitals_core::shutdown::pause;
use vitals_core::DeviceId;

use crate::application::config::MonitorConfig;
use crate::application::readings::{serve_readings, SessionEnd};
use crate::infrastructure::backoff::Backoff;
use crate::MonitorError;

/// How long one accept waits before re-checking the running flag.
const ACCEPT_POLL: Duration = Duration::from_millis(500);

pub struct SessionServer {
    listener: TcpListener,
    id: DeviceId,
    sample_interval: Duration,
}

impl SessionServer {
    /// Binds `config.address:config.port`, retrying with `backoff` until it
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Stopped`] if `running` is cleared first.
    pub async fn bind_with_retry(
        config: &MonitorConfig,
        backoff: &mut Backoff,
        running: &AtomicBool,
    ) -> Result<Self, MonitorError> {
        let addr = config.session_bind_addr();
        loop {
            match TcpListener::bind(&addr).await {
                Ok(listener) => {
                    backoff.reset();
                    return Ok(Self {
                        listener,
                        id: config.id.clone(),
                        sample_interval: config.sample_interval,
                    });
                }
                Err(source) => {
                    let delay = backoff.next_delay();
                    let err = MonitorError::Bind {
                        addr: addr.clone(),
                        source,
                    };
                    warn!("{err}; retrying in {delay:?}");
                    if !pause(delay, running).await {
                        return Err(MonitorError::Stopped);
                    }
                }
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`MonitorError::Io`] if the OS cannot report the address.
    pub fn local_addr(&self) -> Result<SocketAddr, MonitorError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves gateways until `running` is cleared.
    pub async fn run(self, running: Arc<AtomicBool>) {
        let mut backoff = Backoff::default();
        match self.listener.local_addr() {
            Ok(addr) => info!("monitor {} waiting for a gateway on {addr}", self.id),
            Err(_) => info!("monitor {} waiting for a gateway", self.id),
        }

        while running.load(Ordering::Relaxed) {
            let accepted = tokio::time::timeout(ACCEPT_POLL, self.listener.accept()).await;
            match accepted {
                Err(_elapsed) => continue,
                Ok(Err(e)) => {
                    let delay = backoff.next_delay();
                    warn!("accept failed: {e}; retrying in {delay:?}");
                    pause(delay, &running).await;
                }
                Ok(Ok((stream, peer))) => {
                    backoff.reset();
                    info!("gateway connected from {peer}");
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("could not disable Nagle for {peer}: {e}");
                    }
                    let (reader, writer) = stream.into_split();
                    let ended =
                        serve_readings(&self.id, reader, writer, self.sample_interval, &running)
                            .await;
                    match ended {
                        Ok(SessionEnd::GatewayClosed) => info!("gateway {peer} closed the session"),
                        Ok(SessionEnd::Stopped) => {}
                        Err(e) => info!("session with {peer} ended: {e}"),
                    }
                }
            }
        }
        info!("session server stopped");
    }
}
