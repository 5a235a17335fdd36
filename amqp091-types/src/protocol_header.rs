//! Implements the protocol header

use std::convert::TryFrom;

use bytes::Bytes;

const PROTOCOL_HEADER_PREFIX: &[u8; 4] = b"AMQP";

/// Major number of the protocol version spoken by this crate
pub const MAJOR: u8 = 0;

/// Minor number of the protocol version spoken by this crate
pub const MINOR: u8 = 9;

/// Revision number of the protocol version spoken by this crate
pub const REVISION: u8 = 1;

/// Protocol header
///
/// The literal preamble `b"AMQP"` followed by a zero octet and the protocol
/// version. It is the only frame on the wire without a frame end octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Major number
    pub major: u8,

    /// Minor number
    pub minor: u8,

    /// Revision number
    pub revision: u8,
}

impl Default for ProtocolHeader {
    fn default() -> Self {
        Self {
            major: MAJOR,
            minor: MINOR,
            revision: REVISION,
        }
    }
}

impl ProtocolHeader {
    /// Size of the encoded header
    pub const SIZE: usize = 8;

    /// Creates a new protocol header
    pub fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// Creates the AMQP 0-9-1 protocol header
    pub fn amqp091() -> Self {
        Self::default()
    }

    /// Returns whether the header requests AMQP 0-9-1
    pub fn is_amqp091(&self) -> bool {
        *self == Self::amqp091()
    }
}

impl From<ProtocolHeader> for [u8; 8] {
    fn from(value: ProtocolHeader) -> Self {
        [
            PROTOCOL_HEADER_PREFIX[0], // b'A'
            PROTOCOL_HEADER_PREFIX[1], // b'M'
            PROTOCOL_HEADER_PREFIX[2], // b'Q'
            PROTOCOL_HEADER_PREFIX[3], // b'P'
            0,
            value.major,
            value.minor,
            value.revision,
        ]
    }
}

impl From<ProtocolHeader> for Bytes {
    fn from(header: ProtocolHeader) -> Self {
        let bytes: [u8; 8] = header.into();
        Bytes::copy_from_slice(&bytes[..])
    }
}

impl TryFrom<[u8; 8]> for ProtocolHeader {
    type Error = [u8; 8];

    fn try_from(v: [u8; 8]) -> Result<Self, Self::Error> {
        if &v[..4] != PROTOCOL_HEADER_PREFIX || v[4] != 0 {
            return Err(v);
        }
        Ok(Self::new(v[5], v[6], v[7]))
    }
}

impl<'a> TryFrom<&'a [u8]> for ProtocolHeader {
    type Error = &'a [u8];

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        let buf: [u8; 8] = value.try_into().map_err(|_| value)?;
        Self::try_from(buf).map_err(|_| value)
    }
}

/// Returns whether `src` looks like the start of a protocol header rather
/// than a frame. No valid frame type starts with `b'A'`.
pub(crate) fn is_header_prefix(src: &[u8]) -> bool {
    src.first() == Some(&PROTOCOL_HEADER_PREFIX[0])
}
