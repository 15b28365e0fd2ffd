//! In-memory sample sink for tests.
//!
//! Lets tests observe readings without capturing stdout, and wait for a
//! number of samples to arrive from background sample-cycle tasks.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use vitals_core::DeviceId;

use crate::application::dispatch::{Sample, SampleSink};

/// A [`SampleSink`] that records every published sample.
#[derive(Debug, Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<Sample>>,
    published: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Sample>> {
        // Tolerate poisoning.
        self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of every sample recorded so far, in arrival order.
    pub fn samples(&self) -> Vec<Sample> {
        self.guard().clone()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Lines recorded from one device, in arrival order.
    pub fn lines_from(&self, id: &DeviceId) -> Vec<String> {
        self.guard()
            .iter()
            .filter(|s| &s.device_id == id)
            .map(|s| s.line.clone())
            .collect()
    }

    /// Waits until at least `count` samples have been recorded.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.published.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

impl SampleSink for RecordingSink {
    fn publish(&self, sample: Sample) {
        self.guard().push(sample);
        self.published.notify_waiters();
    }
}
