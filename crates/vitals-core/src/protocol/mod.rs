//! Protocol module containing the discovery codec and liveness constants.

pub mod announce;
pub mod liveness;

pub use announce::{decode_announce, encode_announce, AnnounceError};
