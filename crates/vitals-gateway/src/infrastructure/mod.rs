//! Infrastructure layer for the gateway.
//!
//! Contains OS-facing adapters: the UDP discovery socket, the TCP session
//! connector, the sample output sink, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `vitals_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod sink;
pub mod storage;
