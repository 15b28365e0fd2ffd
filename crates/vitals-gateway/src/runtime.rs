//! Starts every gateway component against one [`SharedState`].
//!
//! ```text
//! start()
//!  └─ SharedState::new()
//!  └─ spawn tasks
//!       ├─ DiscoveryListener  (UDP receive loop)
//!       ├─ Dispatcher         (connects pending, launches sample cycles)
//!       ├─ Prober             (periodic liveness sweep)
//!       └─ Cleaner            (periodic purge of disconnected ids)
//! ```
//!
//! All four loops watch the same `running` flag; clearing it stops them
//! within one receive timeout or pause slice.

use std::net::SocketAddr;
use std::sync::{atomic::AtomicBool, Arc};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::dispatch::{Dispatcher, SampleSink};
use crate::application::liveness::{Cleaner, Prober};
use crate::application::session::SessionConnector;
use crate::application::state::SharedState;
use crate::infrastructure::network::discovery::{DiscoveryError, DiscoveryListener};
use crate::infrastructure::storage::config::{ConfigError, GatewayConfig};

/// Errors that prevent the gateway from starting.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// A running gateway.
pub struct GatewayHandle {
    /// The state every component shares; tests inspect it directly.
    pub state: SharedState,
    /// Address the discovery socket actually bound.
    pub discovery_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl GatewayHandle {
    /// Stops every component immediately without waiting for its loop.
    ///
    /// The dispatcher may be parked on a permit held by a cycle blocked on a
    /// silent monitor, so its loop is not joined.
    pub fn abort(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Validates `config`, binds the discovery socket, and spawns all
/// components.
///
/// # Errors
///
/// Returns [`StartError::Config`] for an invalid config and
/// [`StartError::Discovery`] if the discovery socket cannot be bound.
pub async fn start(
    config: &GatewayConfig,
    connector: Arc<dyn SessionConnector>,
    sink: Arc<dyn SampleSink>,
    running: Arc<AtomicBool>,
) -> Result<GatewayHandle, StartError> {
    config.validate()?;
    let state = SharedState::new();

    let listener = DiscoveryListener::bind(config.discovery_addr()?, state.clone()).await?;
    let discovery_addr = listener.local_addr()?;

    let dispatch = config.dispatch_policy();
    let liveness = config.liveness_policy();

    let dispatcher = Dispatcher::new(state.clone(), connector, sink, dispatch);
    let prober = Prober::new(state.clone(), liveness.probe_len, liveness.probe_timeout);
    let cleaner = Cleaner::new(state.clone());

    let tasks = vec![
        tokio::spawn(listener.run(Arc::clone(&running))),
        tokio::spawn(dispatcher.run(Arc::clone(&running))),
        tokio::spawn(prober.run(
            liveness.probe_initial_delay,
            liveness.probe_interval,
            Arc::clone(&running),
        )),
        tokio::spawn(cleaner.run(
            liveness.cleaner_initial_delay,
            liveness.cleaner_interval,
            Arc::clone(&running),
        )),
    ];

    info!("gateway started; discovery on UDP {discovery_addr}");
    Ok(GatewayHandle {
        state,
        discovery_addr,
        tasks,
    })
}
