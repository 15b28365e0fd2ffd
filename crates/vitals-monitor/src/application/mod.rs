//! Application layer of the simulated monitor.
//!
//! # Sub-modules
//!
//! - **`config`** – [`config::MonitorConfig`]: who the monitor is, where it
//!   listens, where it announces, and how often.
//! - **`readings`** – The per-connection loop: one reading line, a pause,
//!   one heartbeat byte, forever.  Generic over the transport so tests can
//!   drive it with in-memory pipes.

pub mod config;
pub mod readings;
