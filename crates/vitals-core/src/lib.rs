//! # vitals-core
//!
//! Shared library for the vital monitor gateway containing the device identity
//! model, the device lifecycle state machine, and the discovery wire codec.
//!
//! This crate is used by both the gateway and the simulated monitor.
//! It has no dependency on sockets or the file system.  The async runtime is
//! only pulled in by the optional `runtime` feature, which adds the
//! `shutdown` helpers both binaries use.
//!
//! # Architecture overview (for beginners)
//!
//! A *monitor* is a bedside device that produces readings.  Monitors announce
//! themselves by broadcasting a small UDP datagram on the LAN.  The *gateway*
//! listens for those announcements, opens one TCP session per monitor, and
//! keeps sampling readings from every live session while pruning dead ones.
//!
//! - **`protocol`** – How an announcement travels over the network.  An
//!   identity is encoded into a compact, versioned, length-prefixed datagram
//!   and decoded defensively on the other end.  The liveness byte constants
//!   shared by both sides live here too.
//!
//! - **`domain`** – Pure types with no I/O: [`DeviceId`], [`DeviceIdentity`],
//!   and the [`DeviceState`] lifecycle every device id moves through.

pub mod domain;
pub mod protocol;
#[cfg(feature = "runtime")]
pub mod shutdown;

pub use domain::device::{host_port, DeviceId, DeviceIdentity, DeviceState, InvalidDeviceId};
pub use protocol::announce::{decode_announce, encode_announce, AnnounceError};
