//! DiscoveryState: the pending queue and the set of known device ids.
//!
//! This is the single dedup point of the gateway.  A device id enters the
//! known map when its first announcement arrives and leaves it only when the
//! cleaner purges it after a disconnection (or when a connect attempt is
//! finally given up).  While the id is known, further announcements from the
//! same device are ignored no matter how fast they arrive.
//!
//! # Locking
//!
//! The whole struct sits behind one `tokio::sync::Mutex` in
//! [`SharedState`](super::state::SharedState).  Every method is in-memory
//! only and at worst O(pending queue length), so the lock is never held
//! across network I/O.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};
use vitals_core::{DeviceId, DeviceIdentity, DeviceState};

/// Result of offering an announced identity to the discovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The id was unknown; the identity is now pending.
    Admitted,
    /// The id is already tracked in the given state; nothing changed.
    Duplicate(DeviceState),
}

/// What happened after a failed connect attempt was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailureOutcome {
    /// The identity went back to the end of the pending queue.
    Requeued { attempt: u32 },
    /// The attempt budget is spent; the id was forgotten.
    Dropped { attempts: u32 },
}

/// Pending identities plus the lifecycle state of every known id.
#[derive(Debug, Default)]
pub struct DiscoveryState {
    pending: VecDeque<DeviceIdentity>,
    known: HashMap<DeviceId, DeviceState>,
    connect_failures: HashMap<DeviceId, u32>,
}

impl DiscoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an announcement.
    ///
    /// An unknown id becomes `Discovered` and its identity is appended to the
    /// pending queue.  A known id is left untouched.
    pub fn admit(&mut self, identity: DeviceIdentity) -> Admission {
        if let Some(state) = self.known.get(&identity.id) {
            return Admission::Duplicate(*state);
        }
        self.known.insert(identity.id.clone(), DeviceState::Discovered);
        self.pending.push_back(identity);
        Admission::Admitted
    }

    /// Removes and returns the oldest pending identity.  Never blocks.
    pub fn pop_pending(&mut self) -> Option<DeviceIdentity> {
        self.pending.pop_front()
    }

    /// Marks a discovered id as connected and clears its failure count.
    pub fn mark_connected(&mut self, id: &DeviceId) -> bool {
        self.connect_failures.remove(id);
        self.transition(id, DeviceState::Connected)
    }

    /// Marks a connected id as disconnected; it stays known until purged.
    pub fn mark_disconnected(&mut self, id: &DeviceId) -> bool {
        self.transition(id, DeviceState::Disconnected)
    }

    /// Records a failed connect attempt for `identity`.
    ///
    /// While fewer than `max_attempts` attempts have failed the identity is
    /// re-queued at the back; after that the id is forgotten so that the next
    /// announcement admits it afresh.
    pub fn record_connect_failure(
        &mut self,
        identity: DeviceIdentity,
        max_attempts: u32,
    ) -> ConnectFailureOutcome {
        let attempts = {
            let count = self.connect_failures.entry(identity.id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if attempts < max_attempts && self.known.contains_key(&identity.id) {
            self.pending.push_back(identity);
            return ConnectFailureOutcome::Requeued { attempt: attempts };
        }

        self.connect_failures.remove(&identity.id);
        self.transition(&identity.id, DeviceState::Unknown);
        ConnectFailureOutcome::Dropped { attempts }
    }

    /// Forgets `id`: removes it from the pending queue and the known map.
    ///
    /// Returns `true` if the id was known.  Purging an unknown id is a no-op.
    pub fn purge(&mut self, id: &DeviceId) -> bool {
        self.pending.retain(|identity| &identity.id != id);
        self.connect_failures.remove(id);
        match self.known.remove(id) {
            Some(DeviceState::Disconnected) => true,
            Some(other) => {
                warn!("purged device {id} while it was {other}");
                true
            }
            None => false,
        }
    }

    /// Current lifecycle state of `id`; `Unknown` if it is not tracked.
    pub fn state_of(&self, id: &DeviceId) -> DeviceState {
        self.known.get(id).copied().unwrap_or(DeviceState::Unknown)
    }

    pub fn is_known(&self, id: &DeviceId) -> bool {
        self.known.contains_key(id)
    }

    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Ids in the pending queue, oldest first.
    pub fn pending_ids(&self) -> Vec<DeviceId> {
        self.pending.iter().map(|identity| identity.id.clone()).collect()
    }

    fn transition(&mut self, id: &DeviceId, next: DeviceState) -> bool {
        let current = self.state_of(id);
        if !current.can_transition_to(next) {
            debug!("ignoring transition of {id} from {current} to {next}");
            return false;
        }
        if next == DeviceState::Unknown {
            self.known.remove(id);
        } else {
            self.known.insert(id.clone(), next);
        }
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> DeviceIdentity {
        DeviceIdentity::new(DeviceId::new(id).unwrap(), "127.0.0.1", 5000)
    }

    fn id(s: &str) -> DeviceId {
        DeviceId::new(s).unwrap()
    }

    #[test]
    fn test_admit_new_id_adds_exactly_one_pending_entry() {
        // Arrange
        let mut state = DiscoveryState::new();

        // Act
        let admission = state.admit(identity("M1"));

        // Assert
        assert_eq!(admission, Admission::Admitted);
        assert_eq!(state.pending_ids(), vec![id("M1")]);
        assert_eq!(state.known_len(), 1);
        assert_eq!(state.state_of(&id("M1")), DeviceState::Discovered);
    }

    #[test]
    fn test_repeated_announcements_do_not_duplicate_state() {
        // Arrange
        let mut state = DiscoveryState::new();

        // Act
        let first = state.admit(identity("M1"));
        let repeats: Vec<_> = (0..1000).map(|_| state.admit(identity("M1"))).collect();

        // Assert
        assert_eq!(first, Admission::Admitted);
        assert!(repeats
            .iter()
            .all(|a| *a == Admission::Duplicate(DeviceState::Discovered)));
        assert_eq!(state.pending_len(), 1);
        assert_eq!(state.known_len(), 1);
    }

    #[test]
    fn test_pop_pending_is_fifo() {
        let mut state = DiscoveryState::new();
        state.admit(identity("M1"));
        state.admit(identity("M2"));
        state.admit(identity("M3"));

        assert_eq!(state.pop_pending().unwrap().id, id("M1"));
        assert_eq!(state.pop_pending().unwrap().id, id("M2"));
        assert_eq!(state.pop_pending().unwrap().id, id("M3"));
        assert!(state.pop_pending().is_none());
    }

    #[test]
    fn test_popped_id_stays_known_while_connecting() {
        let mut state = DiscoveryState::new();
        state.admit(identity("M1"));
        state.pop_pending();

        assert!(state.is_known(&id("M1")));
        assert_eq!(
            state.admit(identity("M1")),
            Admission::Duplicate(DeviceState::Discovered)
        );
    }

    #[test]
    fn test_full_lifecycle_allows_rediscovery() {
        // Arrange
        let mut state = DiscoveryState::new();
        state.admit(identity("M1"));
        state.pop_pending();

        // Act
        assert!(state.mark_connected(&id("M1")));
        assert!(state.mark_disconnected(&id("M1")));
        assert_eq!(
            state.admit(identity("M1")),
            Admission::Duplicate(DeviceState::Disconnected)
        );
        assert!(state.purge(&id("M1")));

        // Assert
        assert_eq!(state.state_of(&id("M1")), DeviceState::Unknown);
        assert_eq!(state.admit(identity("M1")), Admission::Admitted);
        assert_eq!(state.pending_ids(), vec![id("M1")]);
    }

    #[test]
    fn test_mark_disconnected_requires_connected() {
        let mut state = DiscoveryState::new();
        state.admit(identity("M1"));
        assert!(!state.mark_disconnected(&id("M1")));
        assert_eq!(state.state_of(&id("M1")), DeviceState::Discovered);
    }

    #[test]
    fn test_purge_of_unknown_id_is_noop() {
        let mut state = DiscoveryState::new();
        state.admit(identity("M2"));

        assert!(!state.purge(&id("M1")));
        assert_eq!(state.pending_len(), 1);
        assert_eq!(state.known_len(), 1);
    }

    #[test]
    fn test_purge_removes_pending_copy() {
        let mut state = DiscoveryState::new();
        state.admit(identity("M1"));
        state.admit(identity("M2"));

        assert!(state.purge(&id("M1")));
        assert_eq!(state.pending_ids(), vec![id("M2")]);
    }

    #[test]
    fn test_connect_failure_with_single_attempt_drops_and_forgets() {
        // Arrange
        let mut state = DiscoveryState::new();
        state.admit(identity("M1"));
        let popped = state.pop_pending().unwrap();

        // Act
        let outcome = state.record_connect_failure(popped, 1);

        // Assert
        assert_eq!(outcome, ConnectFailureOutcome::Dropped { attempts: 1 });
        assert!(!state.is_known(&id("M1")));
        assert_eq!(state.pending_len(), 0);
        assert_eq!(state.admit(identity("M1")), Admission::Admitted);
    }

    #[test]
    fn test_connect_failure_requeues_until_budget_spent() {
        // Arrange
        let mut state = DiscoveryState::new();
        state.admit(identity("M1"));

        // Act / Assert
        let first = state.pop_pending().unwrap();
        assert_eq!(
            state.record_connect_failure(first, 3),
            ConnectFailureOutcome::Requeued { attempt: 1 }
        );
        let second = state.pop_pending().unwrap();
        assert_eq!(
            state.record_connect_failure(second, 3),
            ConnectFailureOutcome::Requeued { attempt: 2 }
        );
        let third = state.pop_pending().unwrap();
        assert_eq!(
            state.record_connect_failure(third, 3),
            ConnectFailureOutcome::Dropped { attempts: 3 }
        );
        assert!(!state.is_known(&id("M1")));
    }

    #[test]
    fn test_successful_connect_resets_failure_count() {
        let mut state = DiscoveryState::new();
        state.admit(identity("M1"));
        let first = state.pop_pending().unwrap();
        state.record_connect_failure(first, 2);
        state.pop_pending();

        state.mark_connected(&id("M1"));
        state.mark_disconnected(&id("M1"));
        state.purge(&id("M1"));
        state.admit(identity("M1"));
        let again = state.pop_pending().unwrap();

        assert_eq!(
            state.record_connect_failure(again, 2),
            ConnectFailureOutcome::Requeued { attempt: 1 }
        );
    }
}
