//! Domain entities for the vital monitor gateway.
//!
//! This module contains pure types with no infrastructure dependencies.
//! Code in outer layers (the gateway's application and infrastructure
//! layers, the monitor simulator) depends on these types, but the domain
//! never depends on them.

/// Device identity and lifecycle state.
///
/// See [`device::DeviceIdentity`] and [`device::DeviceState`].
pub mod device;
