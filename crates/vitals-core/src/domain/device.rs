//! Device identity and the per-device lifecycle state machine.
//!
//! # Lifecycle (for beginners)
//!
//! Every device id the gateway has ever heard of moves through these states:
//!
//! ```text
//! Unknown ──► Discovered ──► Connected ──► Disconnected ──► Unknown
//!                 │                                            ▲
//!                 └──────────── connect attempt dropped ───────┘
//! ```
//!
//! - `Unknown`: nothing is tracked for this id; the next advertisement is new.
//! - `Discovered`: an advertisement was received; the identity is pending.
//! - `Connected`: a session is open and held by the connection pool.
//! - `Disconnected`: a liveness probe failed; the id waits for the cleaner.
//!
//! Once the cleaner purges a disconnected id it is `Unknown` again, so the
//! same physical device can be rediscovered after it comes back.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a device id fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidDeviceId {
    #[error("device id must not be empty")]
    Empty,
    #[error("device id is {len} bytes; the maximum is {max}")]
    TooLong { len: usize, max: usize },
}

/// Opaque, unique identifier a monitor advertises for itself.
///
/// The id is a non-empty UTF-8 string of at most [`DeviceId::MAX_LEN`] bytes,
/// which is what fits in the one-byte length prefix of the announce datagram.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Longest id that can be carried in an announce datagram.
    pub const MAX_LEN: usize = u8::MAX as usize;

    /// Validates and wraps `id`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDeviceId`] if `id` is empty or longer than
    /// [`DeviceId::MAX_LEN`] bytes.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidDeviceId> {
        let id = id.into();
        if id.is_empty() {
            return Err(InvalidDeviceId::Empty);
        }
        if id.len() > Self::MAX_LEN {
            return Err(InvalidDeviceId::TooLong {
                len: id.len(),
                max: Self::MAX_LEN,
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceId {
    type Error = InvalidDeviceId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a monitor advertises about itself: who it is and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Unique device id; the gateway deduplicates on this field only.
    pub id: DeviceId,
    /// Host name or IP literal the monitor's session server listens on.
    pub address: String,
    /// TCP port of the monitor's session server.
    pub port: u16,
}

impl DeviceIdentity {
    pub fn new(id: DeviceId, address: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            address: address.into(),
            port,
        }
    }

    /// Returns `address:port` in a form accepted by `TcpStream::connect`.
    pub fn endpoint(&self) -> String {
        host_port(&self.address, self.port)
    }
}

/// Joins a host and a port into `host:port`, wrapping bare IPv6 literals in
/// brackets.
pub fn host_port(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.id, self.endpoint())
    }
}

/// Lifecycle state of a device id as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    Unknown,
    Discovered,
    Connected,
    Disconnected,
}

impl DeviceState {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: DeviceState) -> bool {
        use DeviceState::*;
        matches!(
            (self, next),
            (Unknown, Discovered)
                | (Discovered, Connected)
                | (Discovered, Unknown)
                | (Connected, Disconnected)
                | (Disconnected, Unknown)
        )
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Unknown => "unknown",
            DeviceState::Discovered => "discovered",
            DeviceState::Connected => "connected",
            DeviceState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
