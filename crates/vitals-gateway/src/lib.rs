//! vitals-gateway library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the gateway do? (for beginners)
//!
//! Vital monitors announce themselves on the LAN with UDP broadcasts.  The
//! gateway:
//!
//! 1. Listens for those announcements and remembers each new device id once.
//! 2. Opens one TCP session per discovered monitor and keeps it in a pool.
//! 3. Repeatedly picks a session round-robin and reads one reading from it,
//!    with at most `workers` reads in flight at any time.
//! 4. Probes every session periodically and drops the ones that stopped
//!    answering, so the same monitor can be rediscovered when it comes back.

/// Application layer: shared state, dispatcher, prober, cleaner.
pub mod application;

/// Infrastructure layer: sockets, sample output, configuration files.
pub mod infrastructure;

/// Wiring that starts every component against one shared state.
pub mod runtime;
