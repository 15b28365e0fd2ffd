//! Application layer of the gateway.
//!
//! Everything here operates on in-memory state plus two trait seams
//! ([`session::SessionConnector`] for opening transports and
//! [`dispatch::SampleSink`] for delivering readings).  Concrete sockets and
//! output live in `infrastructure`.
//!
//! # Sub-modules
//!
//! - **`discovery_state`** – Pending queue and known-id map; the dedup point
//!   for announcements.
//! - **`connection_pool`** – Ordered list of live sessions with a round-robin
//!   cursor and batch removal.
//! - **`disconnections`** – Ids whose session failed, waiting for the cleaner.
//! - **`session`** – One live transport to one monitor.
//! - **`state`** – The bundle of shared objects every component receives,
//!   plus the [`state::GatewayEvent`] stream.
//! - **`dispatch`** – The bounded dispatcher and the per-task sample cycle.
//! - **`liveness`** – The periodic prober and cleaner.

pub mod connection_pool;
pub mod disconnections;
pub mod discovery_state;
pub mod dispatch;
pub mod liveness;
pub mod session;
pub mod state;
