//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the gateway's TOML configuration from an
//! explicit path or the platform config directory, falls back to defaults
//! when no file exists, and can write a default file for editing.

pub mod config;
