//! Network infrastructure for the gateway.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Listens for UDP announcement broadcasts from monitors
//!   and admits new device ids into the discovery state.  This is how
//!   monitors are found without manual IP configuration.
//!
//! - **`connector`** – The production [`SessionConnector`]: dials the
//!   announced `address:port` over TCP and wraps the stream in a session.
//!
//! [`SessionConnector`]: crate::application::session::SessionConnector

pub mod connector;
pub mod discovery;
