//! Liveness: the prober that detects dead sessions and the cleaner that
//! forgets them.
//!
//! # Why two tasks? (for beginners)
//!
//! Detecting a dead monitor and forgetting it are separate steps:
//!
//! - The [`Prober`] writes a few marker bytes to every live session.  A
//!   session whose write fails is removed from the pool, its device is
//!   marked `Disconnected`, and its id goes onto the disconnection queue.
//! - The [`Cleaner`] drains that queue and removes each id from the set of
//!   known devices.  Only after that is the device "unknown" again, so its
//!   next advertisement is admitted as a brand new discovery.
//!
//! Between the two sweeps a disconnected device's advertisements are still
//! ignored as duplicates.

use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use tracing::{debug, info, warn};
use vitals_core::protocol::liveness::{probe_payload, DEFAULT_PROBE_LEN};
use vitals_core::shutdown::pause;
use vitals_core::DeviceId;

use super::state::{GatewayEvent, SharedState};

/// Schedules and probe shape for the two liveness tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessPolicy {
    pub probe_initial_delay: Duration,
    pub probe_interval: Duration,
    pub probe_len: usize,
    pub probe_timeout: Option<Duration>,
    pub cleaner_initial_delay: Duration,
    pub cleaner_interval: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            probe_initial_delay: Duration::from_secs(5),
            probe_interval: Duration::from_secs(10),
            probe_len: DEFAULT_PROBE_LEN,
            probe_timeout: None,
            cleaner_initial_delay: Duration::from_secs(5),
            cleaner_interval: Duration::from_secs(10),
        }
    }
}

/// Runs `sweep` after `initial_delay`, then again `interval` after each
/// sweep finishes, until `running` is cleared.
async fn run_fixed_delay<F, Fut>(
    initial_delay: Duration,
    interval: Duration,
    running: Arc<AtomicBool>,
    mut sweep: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    if !pause(initial_delay, &running).await {
        return;
    }
    loop {
        sweep().await;
        if !pause(interval, &running).await {
            return;
        }
    }
}

// ── Prober ────────────────────────────────────────────────────────────────────

/// Periodically writes liveness bytes to every pooled session.
pub struct Prober {
    state: SharedState,
    payload: Vec<u8>,
    timeout: Option<Duration>,
}

impl Prober {
    pub fn new(state: SharedState, probe_len: usize, timeout: Option<Duration>) -> Self {
        Self {
            state,
            payload: probe_payload(probe_len),
            timeout,
        }
    }

    /// Probes every session once and retires the ones that fail.
    ///
    /// The pool is snapshotted under its lock, probed with no lock held, and
    /// the failures are removed in a single lock window.  Returns the device
    /// ids that were retired.
    pub async fn sweep(&self) -> Vec<DeviceId> {
        let sessions = self.state.pool.lock().await.snapshot();
        if sessions.is_empty() {
            return Vec::new();
        }
        debug!("probing {} session(s)", sessions.len());

        let mut failed = Vec::new();
        for session in &sessions {
            if let Err(e) = session.probe(&self.payload, self.timeout).await {
                warn!(
                    "probe to {} failed after {}s connected: {e}",
                    session.device_id(),
                    session.uptime().as_secs()
                );
                failed.push(session.id());
            }
        }

        self.state.retire_sessions(&failed).await
    }

    pub async fn run(self, initial_delay: Duration, interval: Duration, running: Arc<AtomicBool>) {
        info!("prober started");
        let this = &self;
        run_fixed_delay(initial_delay, interval, running, move || async move {
            this.sweep().await;
        })
        .await;
        info!("prober stopped");
    }
}

// ── Cleaner ───────────────────────────────────────────────────────────────────

/// Periodically forgets devices whose sessions were retired.
pub struct Cleaner {
    state: SharedState,
}

impl Cleaner {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Drains the disconnection queue and purges each id from discovery.
    ///
    /// Returns the ids that were purged.
    pub async fn sweep(&self) -> Vec<DeviceId> {
        let ids = self.state.disconnections.drain().await;
        if ids.is_empty() {
            return ids;
        }

        {
            let mut discovery = self.state.discovery.lock().await;
            for id in &ids {
                discovery.purge(id);
            }
        }

        for id in &ids {
            info!("Monitor disconnected: {id}");
            self.state.emit(GatewayEvent::DevicePurged {
                device_id: id.clone(),
            });
        }
        ids
    }

    pub async fn run(self, initial_delay: Duration, interval: Duration, running: Arc<AtomicBool>) {
        info!("cleaner started");
        let this = &self;
        run_fixed_delay(initial_delay, interval, running, move || async move {
            this.sweep().await;
        })
        .await;
        info!("cleaner stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::{Session, SessionId};
    use std::sync::atomic::Ordering;
    use tokio::io::{duplex, split, AsyncReadExt, DuplexStream};
    use vitals_core::{DeviceIdentity, DeviceState};

    fn id(s: &str) -> DeviceId {
        DeviceId::new(s).unwrap()
    }

    /// Admits, connects and pools `name`, returning the monitor's end.
    async fn connected(state: &SharedState, name: &str) -> (SessionId, DuplexStream) {
        let identity = DeviceIdentity::new(id(name), "127.0.0.1", 5000);
        {
            let mut discovery = state.discovery.lock().await;
            discovery.admit(identity.clone());
            discovery.pop_pending();
            discovery.mark_connected(&identity.id);
        }
        let (gateway_end, device_end) = duplex(64);
        let (read_half, write_half) = split(gateway_end);
        let session = Session::new(identity, read_half, write_half);
        let session_id = state.pool.lock().await.insert(session).unwrap().id();
        (session_id, device_end)
    }

    #[tokio::test]
    async fn test_probe_sweep_keeps_live_sessions() {
        // Arrange
        let state = SharedState::new();
        let (_, mut device_end) = connected(&state, "M1").await;
        let prober = Prober::new(state.clone(), 3, None);

        // Act
        let retired = prober.sweep().await;

        // Assert
        assert!(retired.is_empty());
        assert_eq!(state.pool.lock().await.len(), 1);
        let mut received = [0xFFu8; 3];
        device_end.read_exact(&mut received).await.unwrap();
        assert_eq!(received, [0, 0, 0]);
    }

    #[tokio::test]
    async fn test_probe_sweep_retires_dead_sessions() {
        // Arrange
        let state = SharedState::new();
        let (_, m1_end) = connected(&state, "M1").await;
        let (_, _m2_end) = connected(&state, "M2").await;
        drop(m1_end);
        let prober = Prober::new(state.clone(), 3, None);

        // Act
        let retired = prober.sweep().await;

        // Assert
        assert_eq!(retired, vec![id("M1")]);
        assert_eq!(state.pool.lock().await.device_ids(), vec![id("M2")]);
        assert_eq!(state.disconnections.snapshot().await, vec![id("M1")]);
        assert_eq!(
            state.discovery.lock().await.state_of(&id("M1")),
            DeviceState::Disconnected
        );
    }

    #[tokio::test]
    async fn test_probe_sweep_on_empty_pool_is_noop() {
        let state = SharedState::new();
        let prober = Prober::new(state.clone(), 3, None);

        assert!(prober.sweep().await.is_empty());
        assert!(state.disconnections.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleaner_purges_queued_ids() {
        // Arrange
        let state = SharedState::new();
        let mut events = state.subscribe();
        let (session_id, _device_end) = connected(&state, "M1").await;
        state.retire_sessions(&[session_id]).await;
        let _ = events.recv().await;
        let cleaner = Cleaner::new(state.clone());

        // Act
        let purged = cleaner.sweep().await;

        // Assert
        assert_eq!(purged, vec![id("M1")]);
        assert!(state.disconnections.is_empty().await);
        assert!(!state.discovery.lock().await.is_known(&id("M1")));
        assert_eq!(
            events.recv().await.unwrap(),
            GatewayEvent::DevicePurged { device_id: id("M1") }
        );
    }

    #[tokio::test]
    async fn test_purged_device_is_admitted_again() {
        // Arrange
        let state = SharedState::new();
        let (session_id, _device_end) = connected(&state, "M1").await;
        state.retire_sessions(&[session_id]).await;
        Cleaner::new(state.clone()).sweep().await;

        // Act
        let mut discovery = state.discovery.lock().await;
        discovery.admit(DeviceIdentity::new(id("M1"), "127.0.0.1", 5000));

        // Assert
        assert_eq!(discovery.pending_ids(), vec![id("M1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prober_runs_after_initial_delay() {
        // Arrange
        let state = SharedState::new();
        let (_, device_end) = connected(&state, "M1").await;
        drop(device_end);
        let running = Arc::new(AtomicBool::new(true));
        let prober = Prober::new(state.clone(), 3, None);
        let task = tokio::spawn(prober.run(
            Duration::from_secs(5),
            Duration::from_secs(10),
            Arc::clone(&running),
        ));

        // Act & Assert: nothing happens before the initial delay.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(state.pool.lock().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(state.pool.lock().await.is_empty());

        running.store(false, Ordering::Relaxed);
        task.await.unwrap();
    }
}
