//! Liveness bytes exchanged on an established session.
//!
//! Both directions of a session carry tiny heartbeats alongside the
//! line-oriented payload:
//!
//! - **monitor → gateway**: after every payload line the monitor writes one
//!   [`HEARTBEAT_BYTE`].  The gateway reads and discards it.
//! - **gateway → monitor**: every prober sweep writes a run of
//!   [`PROBE_MARKER`] bytes.  The monitor drains and ignores them; what matters
//!   is whether the *write* succeeds.
//!
//! A TCP write to a peer that has gone away usually succeeds once (the bytes
//! are buffered) and only the following write reports the reset.  Sending the
//! probe as several separately flushed bytes makes a dead peer visible within
//! a single sweep.

/// Byte the monitor sends after each payload line.
pub const HEARTBEAT_BYTE: u8 = 0x00;

/// Byte the gateway repeats to form a probe.
pub const PROBE_MARKER: u8 = 0x00;

/// Default number of marker bytes per probe.
pub const DEFAULT_PROBE_LEN: usize = 3;

/// Builds a probe payload of `len` marker bytes (at least one).
pub fn probe_payload(len: usize) -> Vec<u8> {
    vec![PROBE_MARKER; len.max(1)]
}
