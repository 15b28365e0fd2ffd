//! The reading loop a monitor runs for one connected gateway.
//!
//! # Wire behaviour (for beginners)
//!
//! Every cycle the monitor writes:
//!
//! ```text
//! "Hello from Vital Monitor: <id>\n"   then, after sample_interval,   0x00
//! ```
//!
//! The trailing byte is the heartbeat the gateway reads after each line.
//! In the other direction the gateway sends probe bytes; the monitor reads
//! and discards them so they never fill the socket buffer.  When the
//! gateway closes its end, the drain sees end of stream and the loop ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;
use vitals_core::protocol::liveness::HEARTBEAT_BYTE;
use vitals_core::DeviceId;

use crate::MonitorError;

/// How a reading session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The gateway closed its end of the connection.
    GatewayClosed,
    /// The monitor is shutting down.
    Stopped,
}

/// The reading line sent every cycle, newline included.
pub fn reading_line(id: &DeviceId) -> String {
    format!("Hello from Vital Monitor: {id}\n")
}

/// Serves readings to one gateway until it disconnects or `running` is
/// cleared.
///
/// # Errors
///
/// Returns [`MonitorError::Io`] when a write or the probe drain fails.
pub async fn serve_readings<R, W>(
    id: &DeviceId,
    reader: R,
    writer: W,
    sample_interval: Duration,
    running: &AtomicBool,
) -> Result<SessionEnd, MonitorError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = reading_line(id);
    tokio::select! {
        written = write_cycles(writer, &line, sample_interval, running) => written,
        drained = drain_probes(reader) => drained.map(|()| SessionEnd::GatewayClosed),
    }
}

async fn write_cycles<W>(
    mut writer: W,
    line: &str,
    sample_interval: Duration,
    running: &AtomicBool,
) -> Result<SessionEnd, MonitorError>
where
    W: AsyncWrite + Unpin,
{
    while running.load(Ordering::Relaxed) {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        tokio::time::sleep(sample_interval).await;
        writer.write_all(&[HEARTBEAT_BYTE]).await?;
        writer.flush().await?;
    }
    Ok(SessionEnd::Stopped)
}

/// Reads and discards probe bytes until end of stream.
async fn drain_probes<R>(mut reader: R) -> Result<(), MonitorError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 64];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        trace!("drained {n} probe byte(s)");
    }
}
