//! SharedState: the objects every gateway component is constructed with.
//!
//! There are three independently locked units:
//!
//! | Unit                   | Writers                         | Readers            |
//! |------------------------|---------------------------------|--------------------|
//! | `discovery`            | listener, dispatcher, cleaner, prober | everyone     |
//! | `pool`                 | dispatcher (insert, cursor), prober (remove) | sample tasks |
//! | `disconnections`       | prober                          | cleaner            |
//!
//! No code path holds two of these locks at once, and none of them is held
//! across network I/O.
//!
//! `SharedState` is cheap to clone: every field is an `Arc` or a broadcast
//! sender.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::info;
use vitals_core::{DeviceId, DeviceIdentity};

use super::connection_pool::ConnectionPool;
use super::disconnections::DisconnectionQueue;
use super::discovery_state::DiscoveryState;
use super::session::SessionId;

/// Capacity of the event broadcast channel; slow subscribers lag, they never
/// block the gateway.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle notifications emitted by the gateway components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A new device id was admitted to the pending queue.
    DeviceDiscovered { identity: DeviceIdentity },
    /// A session was opened and added to the pool.
    DeviceConnected {
        identity: DeviceIdentity,
        session_id: SessionId,
    },
    /// A connect attempt failed.
    ConnectFailed {
        identity: DeviceIdentity,
        will_retry: bool,
        reason: String,
    },
    /// A session was removed from the pool after an I/O failure.
    DeviceDisconnected { device_id: DeviceId },
    /// The cleaner forgot a disconnected id.
    DevicePurged { device_id: DeviceId },
}

/// Shared, independently locked gateway state.
#[derive(Clone)]
pub struct SharedState {
    pub discovery: Arc<Mutex<DiscoveryState>>,
    pub pool: Arc<Mutex<ConnectionPool>>,
    pub disconnections: Arc<DisconnectionQueue>,
    events: broadcast::Sender<GatewayEvent>,
}

impl SharedState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            discovery: Arc::new(Mutex::new(DiscoveryState::new())),
            pool: Arc::new(Mutex::new(ConnectionPool::new())),
            disconnections: Arc::new(DisconnectionQueue::new()),
            events,
        }
    }

    /// Subscribes to lifecycle events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Emits `event`; having no subscribers is not an error.
    pub fn emit(&self, event: GatewayEvent) {
        let _ = self.events.send(event);
    }

    /// Removes failed sessions from the pool in one lock window, then marks
    /// their device ids disconnected and queues them for the cleaner.
    ///
    /// Returns the device ids that were actually removed.  Sessions already
    /// gone from the pool are skipped, so two paths retiring the same session
    /// queue its id only once.
    pub async fn retire_sessions(&self, session_ids: &[SessionId]) -> Vec<DeviceId> {
        if session_ids.is_empty() {
            return Vec::new();
        }

        let removed = self.pool.lock().await.remove_sessions(session_ids);
        if removed.is_empty() {
            return removed;
        }

        {
            let mut discovery = self.discovery.lock().await;
            for id in &removed {
                discovery.mark_disconnected(id);
            }
        }
        self.disconnections.push_all(removed.iter().cloned()).await;

        for id in &removed {
            info!("monitor {id} lost; session removed from pool");
            self.emit(GatewayEvent::DeviceDisconnected {
                device_id: id.clone(),
            });
        }
        removed
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
