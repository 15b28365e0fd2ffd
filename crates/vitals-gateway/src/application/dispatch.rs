//! Dispatcher: connects pending monitors and drives bounded sample cycles.
//!
//! # How the dispatcher works (for beginners)
//!
//! The dispatcher owns a [`Semaphore`] with `workers` permits.  Every
//! iteration of its loop:
//!
//! 1. Waits for a free permit.  With `workers` sample cycles already running
//!    this is where the loop pauses, which caps outstanding reads.
//! 2. Pops the oldest pending identity, if any, and opens a session to it.
//!    The session goes into the pool; a failed connect is re-queued or
//!    dropped according to [`DispatchPolicy::max_connect_attempts`].
//! 3. Spawns one sample-cycle task that carries the permit.  The task picks
//!    a session round-robin, reads one line and one heartbeat byte, hands the
//!    line to the [`SampleSink`], and releases the permit when it ends.
//!
//! The session a task reads from is chosen by the pool cursor, not by which
//! permit launched it.  A session whose cycle failed is flagged and no
//! longer selected, so a dead monitor cannot make the loop relaunch doomed
//! cycles back to back.  When there is nothing pending and no readable
//! session the loop sleeps for [`DispatchPolicy::idle_poll`] instead of
//! spinning.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, SystemTime};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vitals_core::shutdown::pause;
use vitals_core::{DeviceId, DeviceIdentity};

use super::discovery_state::ConnectFailureOutcome;
use super::session::{SessionConnector, SessionId};
use super::state::{GatewayEvent, SharedState};

/// One reading taken from one monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub device_id: DeviceId,
    pub session_id: SessionId,
    pub line: String,
    pub received_at: SystemTime,
}

/// Destination for readings.  Delivery is fire-and-forget.
///
/// Infrastructure implementations print to stdout; tests record samples.
pub trait SampleSink: Send + Sync {
    fn publish(&self, sample: Sample);
}

/// Runtime knobs for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Maximum number of sample cycles in flight.
    pub workers: usize,
    /// Sleep between iterations when there is no work at all.
    pub idle_poll: Duration,
    /// Connect attempts per discovery before the identity is dropped.
    pub max_connect_attempts: u32,
    /// Remove a session as soon as its sample cycle fails, instead of
    /// waiting for the next probe sweep.
    pub evict_on_read_failure: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            workers: 10,
            idle_poll: Duration::from_millis(50),
            max_connect_attempts: 1,
            evict_on_read_failure: false,
        }
    }
}

/// Result of one dispatcher iteration.
#[derive(Debug)]
pub enum DispatchStep {
    /// A sample-cycle task was launched.
    Spawned(JoinHandle<()>),
    /// There was nothing pending and no readable session to sample.
    Idle,
}

/// Connects pending monitors and launches sample cycles.
pub struct Dispatcher {
    state: SharedState,
    connector: Arc<dyn SessionConnector>,
    sink: Arc<dyn SampleSink>,
    policy: DispatchPolicy,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        state: SharedState,
        connector: Arc<dyn SessionConnector>,
        sink: Arc<dyn SampleSink>,
        policy: DispatchPolicy,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(policy.workers.max(1)));
        Self {
            state,
            connector,
            sink,
            policy,
            permits,
        }
    }

    /// Number of sample cycles that could start right now.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs the dispatch loop until `running` is cleared.
    pub async fn run(self, running: Arc<AtomicBool>) {
        info!("dispatcher started with {} workers", self.policy.workers);
        while running.load(Ordering::Relaxed) {
            match self.step().await {
                DispatchStep::Spawned(_) => {}
                DispatchStep::Idle => {
                    pause(self.policy.idle_poll, &running).await;
                }
            }
        }
        info!("dispatcher stopped");
    }

    /// Performs one iteration of the dispatch loop.
    pub async fn step(&self) -> DispatchStep {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return DispatchStep::Idle,
        };

        let next = self.state.discovery.lock().await.pop_pending();
        let had_pending = next.is_some();
        if let Some(identity) = next {
            self.connect(identity).await;
        }

        if !had_pending && !self.state.pool.lock().await.has_readable() {
            return DispatchStep::Idle;
        }

        let state = self.state.clone();
        let sink = Arc::clone(&self.sink);
        let evict = self.policy.evict_on_read_failure;
        DispatchStep::Spawned(tokio::spawn(async move {
            run_sample_cycle(state, sink, evict, permit).await;
        }))
    }

    /// Opens a session to `identity` and adds it to the pool.
    async fn connect(&self, identity: DeviceIdentity) {
        info!("connecting to {identity}");
        match self.connector.connect(&identity).await {
            Ok(session) => {
                self.state
                    .discovery
                    .lock()
                    .await
                    .mark_connected(&identity.id);
                let inserted = self.state.pool.lock().await.insert(session);
                match inserted {
                    Ok(session) => {
                        info!("connected to {identity}");
                        self.state.emit(GatewayEvent::DeviceConnected {
                            identity,
                            session_id: session.id(),
                        });
                    }
                    Err(e) => warn!("{e}; closing the new session"),
                }
            }
            Err(e) => {
                let outcome = self
                    .state
                    .discovery
                    .lock()
                    .await
                    .record_connect_failure(identity.clone(), self.policy.max_connect_attempts);
                let will_retry = match outcome {
                    ConnectFailureOutcome::Requeued { attempt } => {
                        warn!(
                            "connect to {identity} failed (attempt {attempt} of {}): {e}",
                            self.policy.max_connect_attempts
                        );
                        true
                    }
                    ConnectFailureOutcome::Dropped { attempts } => {
                        warn!("dropping {identity} after {attempts} failed connect attempt(s): {e}");
                        false
                    }
                };
                self.state.emit(GatewayEvent::ConnectFailed {
                    identity,
                    will_retry,
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// One sample cycle against the next round-robin session.
///
/// Exits immediately if no session is readable.  A failed read flags the
/// session so it is not selected again; it stays in the pool for the prober
/// to judge unless `evict` is set.
pub async fn run_sample_cycle(
    state: SharedState,
    sink: Arc<dyn SampleSink>,
    evict: bool,
    _permit: OwnedSemaphorePermit,
) {
    let Some(session) = state.pool.lock().await.select_next() else {
        return;
    };

    match session.sample_cycle().await {
        Ok(line) => {
            debug!("sample from {}: {line}", session.device_id());
            sink.publish(Sample {
                device_id: session.device_id().clone(),
                session_id: session.id(),
                line,
                received_at: SystemTime::now(),
            });
        }
        Err(e) => {
            session.mark_read_failed();
            warn!("sample cycle for {} failed: {e}", session.device_id());
            if evict {
                state.retire_sessions(&[session.id()]).await;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::{MockSessionConnector, Session, SessionError};
    use std::sync::Mutex;
    use tokio::io::{duplex, split, AsyncWriteExt, DuplexStream};
    use vitals_core::DeviceState;

    /// Keeps only the line of each published sample.
    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl SampleSink for Lines {
        fn publish(&self, sample: Sample) {
            self.0.lock().unwrap().push(sample.line);
        }
    }

    impl Lines {
        fn taken(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn identity(id: &str) -> DeviceIdentity {
        DeviceIdentity::new(DeviceId::new(id).unwrap(), "127.0.0.1", 5000)
    }

    fn refused() -> SessionError {
        SessionError::ConnectFailed {
            endpoint: "127.0.0.1:5000".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        }
    }

    /// Builds a session over an in-memory pipe and returns the monitor's end.
    fn piped_session(identity: DeviceIdentity) -> (Session, DuplexStream) {
        let (gateway_end, device_end) = duplex(1024);
        let (read_half, write_half) = split(gateway_end);
        (Session::new(identity, read_half, write_half), device_end)
    }

    fn dispatcher(
        state: &SharedState,
        connector: MockSessionConnector,
        sink: Arc<Lines>,
        policy: DispatchPolicy,
    ) -> Dispatcher {
        Dispatcher::new(state.clone(), Arc::new(connector), sink, policy)
    }

    #[tokio::test]
    async fn test_step_is_idle_with_no_pending_and_empty_pool() {
        // Arrange
        let state = SharedState::new();
        let connector = MockSessionConnector::new();
        let d = dispatcher(
            &state,
            connector,
            Arc::default(),
            DispatchPolicy::default(),
        );

        // Act
        let step = d.step().await;

        // Assert
        assert!(matches!(step, DispatchStep::Idle));
        assert_eq!(d.available_workers(), 10);
    }

    #[tokio::test]
    async fn test_step_connects_pending_device_and_samples_it() {
        // Arrange
        let state = SharedState::new();
        state.discovery.lock().await.admit(identity("M1"));
        let (session, mut device_end) = piped_session(identity("M1"));
        device_end.write_all(b"hr=72\n\x00").await.unwrap();
        let mut session = Some(session);
        let mut connector = MockSessionConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(move |_| Ok(session.take().unwrap()));
        let sink = Arc::new(Lines::default());
        let d = dispatcher(&state, connector, Arc::clone(&sink), DispatchPolicy::default());

        // Act
        let step = d.step().await;
        if let DispatchStep::Spawned(handle) = step {
            handle.await.unwrap();
        } else {
            panic!("expected a sample cycle to be spawned");
        }

        // Assert
        let m1 = DeviceId::new("M1").unwrap();
        assert_eq!(state.pool.lock().await.device_ids(), vec![m1.clone()]);
        assert_eq!(
            state.discovery.lock().await.state_of(&m1),
            DeviceState::Connected
        );
        assert_eq!(sink.taken(), vec!["hr=72".to_string()]);
        assert_eq!(d.available_workers(), 10);
    }

    #[tokio::test]
    async fn test_connect_failure_drops_identity_and_forgets_id() {
        // Arrange
        let state = SharedState::new();
        let mut events = state.subscribe();
        state.discovery.lock().await.admit(identity("M1"));
        let mut connector = MockSessionConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Err(refused()));
        let d = dispatcher(&state, connector, Arc::default(), DispatchPolicy::default());

        // Act
        let step = d.step().await;
        if let DispatchStep::Spawned(handle) = step {
            handle.await.unwrap();
        }

        // Assert
        let discovery = state.discovery.lock().await;
        assert_eq!(discovery.pending_len(), 0);
        assert!(!discovery.is_known(&DeviceId::new("M1").unwrap()));
        assert!(state.pool.lock().await.is_empty());
        assert!(matches!(
            events.recv().await.unwrap(),
            GatewayEvent::ConnectFailed {
                will_retry: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_is_requeued_when_retries_allowed() {
        // Arrange
        let state = SharedState::new();
        state.discovery.lock().await.admit(identity("M1"));
        let mut connector = MockSessionConnector::new();
        connector
            .expect_connect()
            .times(2)
            .returning(|_| Err(refused()));
        let policy = DispatchPolicy {
            max_connect_attempts: 2,
            ..DispatchPolicy::default()
        };
        let d = dispatcher(&state, connector, Arc::default(), policy);

        // Act: first attempt re-queues, second attempt drops.
        for _ in 0..2 {
            if let DispatchStep::Spawned(handle) = d.step().await {
                handle.await.unwrap();
            }
        }

        // Assert
        let discovery = state.discovery.lock().await;
        assert_eq!(discovery.pending_len(), 0);
        assert!(!discovery.is_known(&DeviceId::new("M1").unwrap()));
    }

    #[tokio::test]
    async fn test_read_failure_keeps_session_by_default() {
        // Arrange
        let state = SharedState::new();
        let (session, device_end) = piped_session(identity("M1"));
        state.pool.lock().await.insert(session).unwrap();
        drop(device_end);
        let d = dispatcher(
            &state,
            MockSessionConnector::new(),
            Arc::default(),
            DispatchPolicy::default(),
        );

        // Act
        if let DispatchStep::Spawned(handle) = d.step().await {
            handle.await.unwrap();
        }

        // Assert
        assert_eq!(state.pool.lock().await.len(), 1);
        assert!(state.disconnections.is_empty().await);
    }

    #[tokio::test]
    async fn test_dead_session_is_not_sampled_again() {
        // Arrange
        let state = SharedState::new();
        let (session, device_end) = piped_session(identity("M1"));
        state.pool.lock().await.insert(session).unwrap();
        drop(device_end);
        let d = dispatcher(
            &state,
            MockSessionConnector::new(),
            Arc::default(),
            DispatchPolicy::default(),
        );

        // Act: keep stepping for a while, as the run loop would.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(200);
        let mut spawned = 0;
        let mut idle = 0;
        while tokio::time::Instant::now() < deadline {
            match d.step().await {
                DispatchStep::Spawned(handle) => {
                    spawned += 1;
                    handle.await.unwrap();
                }
                DispatchStep::Idle => {
                    idle += 1;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }

        // Assert
        assert_eq!(spawned, 1, "only the first cycle may touch the dead session");
        assert!(idle > 0);
        assert_eq!(state.pool.lock().await.len(), 1);
        assert!(state.pool.lock().await.snapshot()[0].read_failed());
        assert_eq!(d.available_workers(), 10);
    }

    #[tokio::test]
    async fn test_live_sessions_keep_rotating_past_a_dead_one() {
        // Arrange
        let state = SharedState::new();
        let (dead, dead_end) = piped_session(identity("M1"));
        let (live, mut live_end) = piped_session(identity("M2"));
        live_end.write_all(b"a\n\x00b\n\x00").await.unwrap();
        state.pool.lock().await.insert(dead).unwrap();
        state.pool.lock().await.insert(live).unwrap();
        drop(dead_end);
        let sink = Arc::new(Lines::default());
        let d = dispatcher(
            &state,
            MockSessionConnector::new(),
            Arc::clone(&sink),
            DispatchPolicy::default(),
        );

        // Act: the first cycle hits M1 and flags it; the next two read M2.
        for _ in 0..3 {
            if let DispatchStep::Spawned(handle) = d.step().await {
                handle.await.unwrap();
            }
        }

        // Assert
        assert_eq!(sink.taken(), vec!["a", "b"]);
        assert_eq!(state.pool.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_read_failure_evicts_session_when_enabled() {
        // Arrange
        let state = SharedState::new();
        {
            let mut discovery = state.discovery.lock().await;
            discovery.admit(identity("M1"));
            discovery.pop_pending();
            discovery.mark_connected(&DeviceId::new("M1").unwrap());
        }
        let (session, device_end) = piped_session(identity("M1"));
        state.pool.lock().await.insert(session).unwrap();
        drop(device_end);
        let policy = DispatchPolicy {
            evict_on_read_failure: true,
            ..DispatchPolicy::default()
        };
        let d = dispatcher(&state, MockSessionConnector::new(), Arc::default(), policy);

        // Act
        if let DispatchStep::Spawned(handle) = d.step().await {
            handle.await.unwrap();
        }

        // Assert
        assert!(state.pool.lock().await.is_empty());
        assert_eq!(
            state.disconnections.snapshot().await,
            vec![DeviceId::new("M1").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_outstanding_cycles_are_capped_at_worker_count() {
        // Arrange: one silent monitor, so every cycle blocks on its read.
        let state = SharedState::new();
        let (session, _device_end) = piped_session(identity("M1"));
        state.pool.lock().await.insert(session).unwrap();
        let policy = DispatchPolicy {
            workers: 2,
            ..DispatchPolicy::default()
        };
        let d = dispatcher(&state, MockSessionConnector::new(), Arc::default(), policy);

        // Act
        let first = d.step().await;
        let second = d.step().await;
        let third = tokio::time::timeout(Duration::from_millis(100), d.step()).await;

        // Assert
        assert!(matches!(first, DispatchStep::Spawned(_)));
        assert!(matches!(second, DispatchStep::Spawned(_)));
        assert!(third.is_err(), "a third cycle must wait for a free worker");
        assert_eq!(d.available_workers(), 0);
    }

    #[tokio::test]
    async fn test_cycle_on_empty_pool_exits_without_publishing() {
        let state = SharedState::new();
        let sink = Arc::new(Lines::default());
        let permit = Arc::new(Semaphore::new(1)).acquire_owned().await.unwrap();

        run_sample_cycle(state, sink.clone(), false, permit).await;

        assert!(sink.taken().is_empty());
    }

    #[tokio::test]
    async fn test_cycles_rotate_across_sessions() {
        // Arrange
        let state = SharedState::new();
        let mut devices = Vec::new();
        for id in ["M1", "M2", "M3"] {
            let (session, mut device_end) = piped_session(identity(id));
            device_end
                .write_all(format!("from {id}\n\x00").as_bytes())
                .await
                .unwrap();
            state.pool.lock().await.insert(session).unwrap();
            devices.push(device_end);
        }
        let sink = Arc::new(Lines::default());
        let d = dispatcher(
            &state,
            MockSessionConnector::new(),
            Arc::clone(&sink),
            DispatchPolicy::default(),
        );

        // Act
        for _ in 0..3 {
            if let DispatchStep::Spawned(handle) = d.step().await {
                handle.await.unwrap();
            }
        }

        // Assert
        let mut lines = sink.taken();
        lines.sort();
        assert_eq!(lines, vec!["from M1", "from M2", "from M3"]);
    }
}
