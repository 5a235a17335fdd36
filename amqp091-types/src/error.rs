//! Errors raised while encoding or decoding frames

use std::io;

/// Frame layer errors
///
/// Every variant other than [`Error::Io`] is a protocol violation: the peer
/// sent something the frame layer cannot accept, and no frame is produced.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error reported by a `tokio_util` framed transport
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// The peer answered with its own protocol header, which means it does
    /// not speak the requested protocol version
    #[error("Protocol header mismatch. Found {0:?}")]
    ProtocolHeaderMismatch([u8; 8]),

    /// The frame type octet is not one of method, header, body or heartbeat
    #[error("Unknown frame type {0}")]
    UnknownFrameType(u8),

    /// The declared frame size exceeds the negotiated maximum
    #[error("Frame of {size} bytes exceeds the maximum frame size of {max} bytes")]
    FrameTooLarge {
        /// Total size of the frame, including header and frame end
        size: u64,
        /// Maximum frame size in effect
        max: u32,
    },

    /// The octet after the payload is not the frame end marker
    #[error("Frame end octet missing. Found {0:#04x}")]
    FrameEndMissing(u8),

    /// Heartbeat frames are only valid on channel 0
    #[error("Heartbeat frame received on channel {0}")]
    HeartbeatOnChannel(u16),

    /// Heartbeat frames carry no payload
    #[error("Heartbeat frame with a payload of {0} bytes")]
    HeartbeatPayload(u32),

    /// The payload ended before all arguments were read
    #[error("Truncated frame payload")]
    Truncated,

    /// The payload is longer than the arguments of the method
    #[error("{0} unexpected trailing bytes after method arguments")]
    TrailingBytes(usize),

    /// Unknown method id inside a class modelled by this crate
    #[error("Unknown method {class_id}.{method_id}")]
    UnknownMethod {
        /// Class id
        class_id: u16,
        /// Method id
        method_id: u16,
    },

    /// A short string is not valid UTF-8
    #[error("Short string is not valid UTF-8")]
    InvalidUtf8,

    /// A short string longer than 255 bytes cannot be encoded
    #[error("Short string of {0} bytes exceeds 255 bytes")]
    ShortStringTooLong(usize),

    /// A payload longer than `u32::MAX` bytes cannot be encoded
    #[error("Payload of {0} bytes cannot be encoded in a single frame")]
    PayloadTooLarge(usize),
}
