//! TCP implementation of [`SessionConnector`].

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;
use vitals_core::DeviceIdentity;

use crate::application::session::{Session, SessionConnector, SessionError};

/// Dials monitors over plain TCP.
///
/// Connect has no timeout of its own; an unreachable monitor holds one
/// dispatcher iteration until the OS gives up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionConnector for TcpConnector {
    async fn connect(&self, identity: &DeviceIdentity) -> Result<Session, SessionError> {
        let endpoint = identity.endpoint();
        let stream = TcpStream::connect(&endpoint)
            .await
            .map_err(|source| SessionError::ConnectFailed {
                endpoint: endpoint.clone(),
                source,
            })?;
        // Readings are tiny; do not let Nagle hold probe bytes back.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle on {endpoint}: {e}");
        }
        Ok(Session::from_tcp(identity.clone(), stream))
    }
}
