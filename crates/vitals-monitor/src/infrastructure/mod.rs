//! Infrastructure layer for the simulated monitor.
//!
//! - **`network`** – The UDP announcer and the TCP session server.
//! - **`backoff`** – Capped exponential delay used when binding or
//!   accepting fails.

pub mod backoff;
pub mod network;
