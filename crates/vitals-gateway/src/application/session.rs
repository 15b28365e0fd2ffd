//! Session: one live, bidirectional transport to one monitor.
//!
//! A session owns the two halves of the transport separately:
//!
//! - the **reader** carries `"<text>\n"` readings followed by one heartbeat
//!   byte per cycle, consumed by sample-cycle tasks;
//! - the **writer** carries the prober's liveness bytes.
//!
//! Each half has its own async mutex, so a probe never waits behind a sample
//! read that is blocked on a silent monitor.  Neither lock is related to the
//! pool lock: the pool hands out `Arc<Session>` clones and all I/O happens
//! after the pool lock has been released.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use uuid::Uuid;
use vitals_core::{DeviceId, DeviceIdentity};

/// Unique id of one session; a reconnecting device gets a fresh one.
pub type SessionId = Uuid;

/// Longest reading accepted on one line, newline included.
pub const MAX_LINE_BYTES: u64 = 64 * 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Errors that can occur while opening or using a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport to the monitor could not be opened.
    #[error("failed to connect to {endpoint}: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the established transport.
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The monitor closed its end of the transport.
    #[error("session closed by monitor")]
    Closed,
    /// A reading did not end within [`MAX_LINE_BYTES`].
    #[error("reading exceeds {0} bytes without a newline")]
    LineTooLong(u64),
    /// A probe write did not complete in time.
    #[error("probe timed out after {0:?}")]
    ProbeTimeout(Duration),
}

/// Opens sessions to announced monitors.
///
/// The production implementation dials TCP; tests substitute in-memory
/// transports or a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Opens a transport to `identity.address:identity.port`.
    async fn connect(&self, identity: &DeviceIdentity) -> Result<Session, SessionError>;
}

/// A live transport to one monitor.
pub struct Session {
    id: SessionId,
    identity: DeviceIdentity,
    established_at: Instant,
    read_failed: AtomicBool,
    reader: Mutex<BufReader<BoxedReader>>,
    writer: Mutex<BoxedWriter>,
}

impl Session {
    /// Wraps an already-open transport.
    pub fn new<R, W>(identity: DeviceIdentity, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            identity,
            established_at: Instant::now(),
            read_failed: AtomicBool::new(false),
            reader: Mutex::new(BufReader::new(Box::new(reader) as BoxedReader)),
            writer: Mutex::new(Box::new(writer) as BoxedWriter),
        }
    }

    /// Wraps a connected TCP stream.
    pub fn from_tcp(identity: DeviceIdentity, stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self::new(identity, read_half, write_half)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.identity.id
    }

    /// How long the transport has been open.
    pub fn uptime(&self) -> Duration {
        self.established_at.elapsed()
    }

    /// Marks the reading side as unusable.  The pool stops handing this
    /// session to sample cycles; the prober still decides when it goes.
    pub fn mark_read_failed(&self) {
        self.read_failed.store(true, Ordering::Relaxed);
    }

    pub fn read_failed(&self) -> bool {
        self.read_failed.load(Ordering::Relaxed)
    }

    /// Performs one sample cycle: reads one line, then one heartbeat byte.
    ///
    /// The reader lock is held for the whole cycle so two tasks that happen
    /// to select the same session cannot split a line and its heartbeat.
    /// The returned line has its trailing `\n` (and `\r`) removed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] on end of stream,
    /// [`SessionError::LineTooLong`] for an unterminated oversized line, and
    /// [`SessionError::Io`] for transport failures.
    pub async fn sample_cycle(&self) -> Result<String, SessionError> {
        let mut reader = self.reader.lock().await;

        let mut line = String::new();
        let n = (&mut *reader)
            .take(MAX_LINE_BYTES)
            .read_line(&mut line)
            .await?;
        if n == 0 {
            return Err(SessionError::Closed);
        }
        if !line.ends_with('\n') {
            if n as u64 >= MAX_LINE_BYTES {
                return Err(SessionError::LineTooLong(MAX_LINE_BYTES));
            }
            return Err(SessionError::Closed);
        }
        trim_line_ending(&mut line);

        match reader.read_u8().await {
            Ok(_heartbeat) => Ok(line),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(SessionError::Closed),
            Err(e) => Err(SessionError::Io(e)),
        }
    }

    /// Writes `payload` to the monitor one flushed byte at a time.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] on the first failed write or flush, or
    /// [`SessionError::ProbeTimeout`] if `timeout` elapses first.
    pub async fn probe(
        &self,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<(), SessionError> {
        let write = async {
            let mut writer = self.writer.lock().await;
            for byte in payload {
                writer.write_all(std::slice::from_ref(byte)).await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| SessionError::ProbeTimeout(limit))?
                .map_err(SessionError::Io),
            None => write.await.map_err(SessionError::Io),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("established_at", &self.established_at)
            .field("read_failed", &self.read_failed())
            .finish_non_exhaustive()
    }
}

fn trim_line_ending(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split};
    use tokio_test::io::Builder;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new(DeviceId::new("M1").unwrap(), "127.0.0.1", 5000)
    }

    #[tokio::test]
    async fn test_sample_cycle_reads_line_then_heartbeat() {
        // Arrange
        let reader = Builder::new()
            .read(b"Hello from Vital Monitor: M1\n")
            .read(&[0x00])
            .build();
        let session = Session::new(identity(), reader, tokio::io::sink());

        // Act
        let line = session.sample_cycle().await;

        // Assert
        assert_eq!(line.unwrap(), "Hello from Vital Monitor: M1");
    }

    #[tokio::test]
    async fn test_sample_cycle_strips_crlf() {
        let reader = Builder::new().read(b"hr=72\r\n\x00").build();
        let session = Session::new(identity(), reader, tokio::io::sink());

        assert_eq!(session.sample_cycle().await.unwrap(), "hr=72");
    }

    #[tokio::test]
    async fn test_consecutive_cycles_do_not_mix_lines_and_heartbeats() {
        let reader = Builder::new().read(b"one\n\x00two\n\x00").build();
        let session = Session::new(identity(), reader, tokio::io::sink());

        assert_eq!(session.sample_cycle().await.unwrap(), "one");
        assert_eq!(session.sample_cycle().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_sample_cycle_reports_closed_on_eof() {
        let reader = Builder::new().build();
        let session = Session::new(identity(), reader, tokio::io::sink());

        assert!(matches!(
            session.sample_cycle().await,
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_sample_cycle_reports_closed_when_heartbeat_missing() {
        let reader = Builder::new().read(b"last words\n").build();
        let session = Session::new(identity(), reader, tokio::io::sink());

        assert!(matches!(
            session.sample_cycle().await,
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_sample_cycle_propagates_read_error() {
        let reader = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let session = Session::new(identity(), reader, tokio::io::sink());

        assert!(matches!(
            session.sample_cycle().await,
            Err(SessionError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_sample_cycle_rejects_unterminated_oversized_line() {
        // Arrange
        let (gateway_end, mut device_end) = duplex(1024);
        let (read_half, write_half) = split(gateway_end);
        let session = Session::new(identity(), read_half, write_half);
        let writer = tokio::spawn(async move {
            let chunk = vec![b'x'; 1024];
            let mut sent = 0u64;
            while sent <= MAX_LINE_BYTES {
                if device_end.write_all(&chunk).await.is_err() {
                    break;
                }
                sent += chunk.len() as u64;
            }
            device_end
        });

        // Act
        let result = session.sample_cycle().await;

        // Assert
        assert!(matches!(result, Err(SessionError::LineTooLong(_))));
        drop(session);
        let _ = writer.await;
    }

    #[tokio::test]
    async fn test_probe_writes_every_marker_byte() {
        // Arrange
        let writer = Builder::new().write(&[0]).write(&[0]).write(&[0]).build();
        let session = Session::new(identity(), tokio::io::empty(), writer);

        // Act
        let result = session.probe(&[0, 0, 0], None).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_probe_fails_when_monitor_has_gone() {
        // Arrange
        let (gateway_end, device_end) = duplex(64);
        let (read_half, write_half) = split(gateway_end);
        let session = Session::new(identity(), read_half, write_half);
        drop(device_end);

        // Act
        let result = session.probe(&[0, 0, 0], None).await;

        // Assert
        assert!(matches!(result, Err(SessionError::Io(_))));
    }

    #[tokio::test]
    async fn test_probe_times_out_on_stalled_transport() {
        // Arrange: a 1-byte pipe nobody reads fills up after the first byte.
        let (gateway_end, _device_end) = duplex(1);
        let (read_half, write_half) = split(gateway_end);
        let session = Session::new(identity(), read_half, write_half);

        // Act
        let result = session
            .probe(&[0, 0, 0], Some(Duration::from_millis(50)))
            .await;

        // Assert
        assert!(matches!(result, Err(SessionError::ProbeTimeout(_))));
    }

    #[test]
    fn test_each_session_gets_a_fresh_id() {
        let a = Session::new(identity(), tokio::io::empty(), tokio::io::sink());
        let b = Session::new(identity(), tokio::io::empty(), tokio::io::sink());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.device_id().as_str(), "M1");
        assert!(a.uptime() < Duration::from_secs(60));
    }

    #[test]
    fn test_read_failed_flag_starts_clear_and_sticks() {
        let session = Session::new(identity(), tokio::io::empty(), tokio::io::sink());
        assert!(!session.read_failed());

        session.mark_read_failed();

        assert!(session.read_failed());
    }
}
