//! Sample sinks: where readings go once a sample cycle has produced them.
//!
//! - **[`StdoutSink`]** – Writes each reading to standard output, one line
//!   per sample.  This is what the `vitals-gateway` binary uses.
//! - **`mock`** – A [`RecordingSink`](mock::RecordingSink) that keeps samples
//!   in memory so tests can assert on them.

pub mod mock;

use std::io::Write;

use tracing::debug;

use crate::application::dispatch::{Sample, SampleSink};

/// Prints every reading on its own stdout line.
///
/// Output is best effort: a closed or broken stdout drops the sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl SampleSink for StdoutSink {
    fn publish(&self, sample: Sample) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", sample.line) {
            debug!("dropping sample from {}: {e}", sample.device_id);
        }
    }
}
