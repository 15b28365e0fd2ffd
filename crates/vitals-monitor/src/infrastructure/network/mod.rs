//! Network infrastructure for the simulated monitor.
//!
//! # Sub-modules
//!
//! - **`announcer`** – Broadcasts the monitor's identity over UDP at a fixed
//!   interval so gateways on the LAN can discover it.
//! - **`server`** – Accepts one gateway connection at a time and runs the
//!   reading loop on it.

pub mod announcer;
pub mod server;
