//! DisconnectionQueue: device ids whose session failed, awaiting the cleaner.
//!
//! The prober (and the sample cycle, when eviction on read failure is
//! enabled) pushes ids here after removing their sessions from the pool.
//! The cleaner drains the queue on its own schedule.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use vitals_core::DeviceId;

/// FIFO of disconnected device ids with its own lock.
#[derive(Debug, Default)]
pub struct DisconnectionQueue {
    inner: Mutex<VecDeque<DeviceId>>,
}

impl DisconnectionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_all(&self, ids: impl IntoIterator<Item = DeviceId>) {
        self.inner.lock().await.extend(ids);
    }

    /// Takes every queued id, oldest first, leaving the queue empty.
    pub async fn drain(&self) -> Vec<DeviceId> {
        self.inner.lock().await.drain(..).collect()
    }

    /// Copy of the queued ids without removing them.
    pub async fn snapshot(&self) -> Vec<DeviceId> {
        self.inner.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
