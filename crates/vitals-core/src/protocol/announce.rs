//! Binary codec for monitor announcement datagrams.
//!
//! Wire format:
//! ```text
//! [magic:4 "VMAN"][version:1][id_len:1][id:N][addr_len:1][addr:M][port:2]
//! ```
//! Strings are UTF-8 with a one-byte length prefix.  The port is big-endian.
//! A datagram must contain exactly one record: trailing bytes are rejected.
//!
//! # Defensive decoding
//!
//! Announcements arrive from anything on the LAN that can send a UDP packet,
//! so the decoder never trusts a length field before checking it against the
//! bytes actually present, never allocates more than the datagram size, and
//! returns an [`AnnounceError`] instead of panicking on any input.

use crate::domain::device::{DeviceId, DeviceIdentity};
use thiserror::Error;

/// Leading bytes identifying an announcement datagram.
pub const ANNOUNCE_MAGIC: [u8; 4] = *b"VMAN";

/// Current announcement format version.
pub const ANNOUNCE_VERSION: u8 = 0x01;

/// Size of the fixed prefix (magic + version).
pub const ANNOUNCE_HEADER_SIZE: usize = 5;

/// Longest address string the format can carry.
pub const MAX_ADDRESS_LEN: usize = u8::MAX as usize;

/// Largest well-formed datagram: header, two maximal strings with their
/// prefixes, and the port.
pub const MAX_ANNOUNCE_SIZE: usize =
    ANNOUNCE_HEADER_SIZE + 1 + DeviceId::MAX_LEN + 1 + MAX_ADDRESS_LEN + 2;

/// Smallest well-formed datagram: header, one-byte id, one-byte address, port.
pub const MIN_ANNOUNCE_SIZE: usize = ANNOUNCE_HEADER_SIZE + 1 + 1 + 1 + 1 + 2;

/// Errors that can occur while encoding or decoding an announcement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnounceError {
    /// The datagram ends before a required field.
    #[error("truncated announcement: need at least {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The datagram is larger than any valid announcement.
    #[error("oversized announcement: {size} bytes exceeds maximum of {max}")]
    Oversized { size: usize, max: usize },

    /// The datagram does not start with [`ANNOUNCE_MAGIC`].
    #[error("bad magic: {0:02X?}")]
    BadMagic([u8; 4]),

    /// The version byte is not one this codec understands.
    #[error("unsupported announcement version: {0}")]
    UnsupportedVersion(u8),

    /// A field value is present but invalid (empty, not UTF-8, port 0, ...).
    #[error("malformed field `{field}`: {reason}")]
    MalformedField { field: &'static str, reason: String },

    /// A field is too long to encode.
    #[error("field `{field}` is {len} bytes; the maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Extra bytes follow a complete record.
    #[error("{0} trailing byte(s) after announcement")]
    TrailingBytes(usize),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `identity` into an announcement datagram.
///
/// # Errors
///
/// Returns [`AnnounceError::FieldTooLong`] if the address does not fit in the
/// one-byte length prefix, or [`AnnounceError::MalformedField`] for port 0 or
/// an empty address.
///
/// # Examples
///
/// ```rust
/// use vitals_core::{decode_announce, encode_announce, DeviceId, DeviceIdentity};
///
/// let identity = DeviceIdentity::new(DeviceId::new("M1").unwrap(), "10.0.0.7", 5001);
/// let bytes = encode_announce(&identity).unwrap();
/// assert_eq!(decode_announce(&bytes).unwrap(), identity);
/// ```
pub fn encode_announce(identity: &DeviceIdentity) -> Result<Vec<u8>, AnnounceError> {
    if identity.address.is_empty() {
        return Err(AnnounceError::MalformedField {
            field: "address",
            reason: "must not be empty".to_string(),
        });
    }
    if identity.address.len() > MAX_ADDRESS_LEN {
        return Err(AnnounceError::FieldTooLong {
            field: "address",
            len: identity.address.len(),
            max: MAX_ADDRESS_LEN,
        });
    }
    if identity.port == 0 {
        return Err(AnnounceError::MalformedField {
            field: "port",
            reason: "must not be 0".to_string(),
        });
    }

    let id = identity.id.as_str();
    let mut buf =
        Vec::with_capacity(ANNOUNCE_HEADER_SIZE + 2 + id.len() + identity.address.len() + 2);
    buf.extend_from_slice(&ANNOUNCE_MAGIC);
    buf.push(ANNOUNCE_VERSION);
    write_short_string(&mut buf, id);
    write_short_string(&mut buf, &identity.address);
    buf.extend_from_slice(&identity.port.to_be_bytes());
    Ok(buf)
}

/// Decodes one announcement from `bytes`, which must hold exactly one record.
///
/// # Errors
///
/// Returns [`AnnounceError`] if the bytes are truncated, oversized, carry the
/// wrong magic or version, contain an invalid field, or have trailing data.
pub fn decode_announce(bytes: &[u8]) -> Result<DeviceIdentity, AnnounceError> {
    if bytes.len() > MAX_ANNOUNCE_SIZE {
        return Err(AnnounceError::Oversized {
            size: bytes.len(),
            max: MAX_ANNOUNCE_SIZE,
        });
    }
    require_len(bytes, ANNOUNCE_HEADER_SIZE)?;

    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != ANNOUNCE_MAGIC {
        return Err(AnnounceError::BadMagic(magic));
    }
    let version = bytes[4];
    if version != ANNOUNCE_VERSION {
        return Err(AnnounceError::UnsupportedVersion(version));
    }

    let (id, id_end) = read_short_string(bytes, ANNOUNCE_HEADER_SIZE, "id")?;
    let id = DeviceId::new(id).map_err(|e| AnnounceError::MalformedField {
        field: "id",
        reason: e.to_string(),
    })?;

    let (address, addr_end) = read_short_string(bytes, id_end, "address")?;
    if address.is_empty() {
        return Err(AnnounceError::MalformedField {
            field: "address",
            reason: "must not be empty".to_string(),
        });
    }

    require_len(bytes, addr_end + 2)?;
    let port = u16::from_be_bytes([bytes[addr_end], bytes[addr_end + 1]]);
    if port == 0 {
        return Err(AnnounceError::MalformedField {
            field: "port",
            reason: "must not be 0".to_string(),
        });
    }

    let end = addr_end + 2;
    if bytes.len() > end {
        return Err(AnnounceError::TrailingBytes(bytes.len() - end));
    }

    Ok(DeviceIdentity { id, address, port })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize) -> Result<(), AnnounceError> {
    if buf.len() < needed {
        Err(AnnounceError::Truncated {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Writes a 1-byte length prefix followed by the UTF-8 bytes.
///
/// Callers validate the length first; both fields are capped at 255 bytes.
fn write_short_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u8::MAX as usize);
    buf.push(len as u8);
    buf.extend_from_slice(&bytes[..len]);
}

/// Reads a 1-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after it.
fn read_short_string(
    buf: &[u8],
    offset: usize,
    field: &'static str,
) -> Result<(String, usize), AnnounceError> {
    require_len(buf, offset + 1)?;
    let len = buf[offset] as usize;
    let start = offset + 1;
    require_len(buf, start + len)?;
    let s = std::str::from_utf8(&buf[start..start + len]).map_err(|e| {
        AnnounceError::MalformedField {
            field,
            reason: format!("invalid UTF-8: {e}"),
        }
    })?;
    Ok((s.to_string(), start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
