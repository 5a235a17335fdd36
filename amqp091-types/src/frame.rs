//! AMQP 0-9-1 frame type and the incremental decoder
//!
//! Every frame except the protocol header is laid out as
//! `[type:1][channel:2][payload_size:4][payload][0xCE]`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    constants::{
        FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEADER_SIZE, FRAME_HEARTBEAT, FRAME_METHOD,
    },
    method::{ConnectionMethod, Method},
    primitives::{get_u16, get_u64},
    protocol_header::{self, ProtocolHeader},
    Error,
};

/// AMQP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Channel the frame is addressed to, 0 for connection level frames
    pub channel: u16,

    /// Frame body
    pub body: FrameBody,
}

/// AMQP frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// The protocol header. Only ever sent, never decoded.
    ProtocolHeader(ProtocolHeader),

    /// Method frame
    Method(Method),

    /// Content header frame
    Header(ContentHeader),

    /// Content body frame
    Body(Bytes),

    /// Heartbeat frame
    Heartbeat,
}

/// Content header, properties left encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHeader {
    /// Class of the content
    pub class_id: u16,

    /// Unused, always 0
    pub weight: u16,

    /// Total size of the content body frames that follow
    pub body_size: u64,

    /// Encoded property flags and property list
    pub properties: Bytes,
}

impl ContentHeader {
    fn decode(mut payload: Bytes) -> Result<Self, Error> {
        Ok(Self {
            class_id: get_u16(&mut payload)?,
            weight: get_u16(&mut payload)?,
            body_size: get_u64(&mut payload)?,
            properties: payload,
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16(self.class_id);
        dst.put_u16(self.weight);
        dst.put_u64(self.body_size);
        dst.put_slice(&self.properties);
    }
}

impl Frame {
    /// Creates a new frame
    pub fn new(channel: impl Into<u16>, body: FrameBody) -> Self {
        Self {
            channel: channel.into(),
            body,
        }
    }

    /// Creates the protocol header frame
    pub fn protocol_header() -> Self {
        Self::new(0u16, FrameBody::ProtocolHeader(ProtocolHeader::amqp091()))
    }

    /// Creates a method frame
    pub fn method(channel: u16, method: impl Into<Method>) -> Self {
        Self::new(channel, FrameBody::Method(method.into()))
    }

    /// Creates a heartbeat frame
    pub fn heartbeat() -> Self {
        Self::new(0u16, FrameBody::Heartbeat)
    }

    /// Get the channel of the frame
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Get the body of the frame
    pub fn body(&self) -> &FrameBody {
        &self.body
    }

    /// Consume the frame to get the frame body
    pub fn into_body(self) -> FrameBody {
        self.body
    }

    /// Whether the frame is terminated by [`FRAME_END`]. Only the protocol
    /// header is not.
    pub fn needs_terminator(&self) -> bool {
        !matches!(self.body, FrameBody::ProtocolHeader(_))
    }

    /// Whether the frame belongs to connection negotiation and may be sent
    /// before the connection is established
    pub fn is_part_of_handshake(&self) -> bool {
        match &self.body {
            FrameBody::ProtocolHeader(_) => true,
            FrameBody::Method(Method::Connection(method)) => matches!(
                method,
                ConnectionMethod::StartOk(_)
                    | ConnectionMethod::SecureOk { .. }
                    | ConnectionMethod::TuneOk(_)
                    | ConnectionMethod::Open { .. }
            ),
            _ => false,
        }
    }

    /// Encodes the frame without the frame end octet
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        let frame_type = match &self.body {
            FrameBody::ProtocolHeader(header) => {
                let buf: [u8; 8] = (*header).into();
                dst.put_slice(&buf);
                return Ok(());
            }
            FrameBody::Method(_) => FRAME_METHOD,
            FrameBody::Header(_) => FRAME_HEADER,
            FrameBody::Body(_) => FRAME_BODY,
            FrameBody::Heartbeat => FRAME_HEARTBEAT,
        };

        let start = dst.len();
        dst.put_u8(frame_type);
        dst.put_u16(self.channel);
        dst.put_u32(0); // patched below
        let payload_start = dst.len();

        match &self.body {
            FrameBody::Method(method) => method.encode(dst)?,
            FrameBody::Header(header) => header.encode(dst),
            FrameBody::Body(payload) => dst.put_slice(payload),
            FrameBody::Heartbeat | FrameBody::ProtocolHeader(_) => {}
        }

        let payload_size = dst.len() - payload_start;
        let size = u32::try_from(payload_size).map_err(|_| Error::PayloadTooLarge(payload_size))?;
        dst[start + 3..payload_start].copy_from_slice(&size.to_be_bytes());
        Ok(())
    }
}

/// A frame decoded from the front of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// The decoded frame
    pub frame: Frame,

    /// Number of bytes the frame occupied, including header and frame end
    pub total_size: usize,
}

/// Tries to decode one frame from the front of `src`
///
/// Returns `Ok(None)` if `src` holds an incomplete frame; the caller should
/// call again with the same bytes followed by whatever arrived since. The
/// size declared in the frame header is checked against `max_frame_size`
/// (0 disables the check) as soon as the header is available so a corrupted
/// length never makes the caller buffer an unbounded amount of data.
pub fn decode(src: &[u8], max_frame_size: u32) -> Result<Option<ReceivedFrame>, Error> {
    if protocol_header::is_header_prefix(src) {
        return match src.len() < ProtocolHeader::SIZE {
            true => Ok(None),
            false => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&src[..ProtocolHeader::SIZE]);
                Err(Error::ProtocolHeaderMismatch(buf))
            }
        };
    }

    if src.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &src[..FRAME_HEADER_SIZE];
    let frame_type = header.get_u8();
    let channel = header.get_u16();
    let payload_size = header.get_u32();

    if !matches!(
        frame_type,
        FRAME_METHOD | FRAME_HEADER | FRAME_BODY | FRAME_HEARTBEAT
    ) {
        return Err(Error::UnknownFrameType(frame_type));
    }
    if frame_type == FRAME_HEARTBEAT && payload_size != 0 {
        return Err(Error::HeartbeatPayload(payload_size));
    }

    // u64 so that a hostile size cannot overflow on 32-bit targets
    let declared_size = FRAME_HEADER_SIZE as u64 + u64::from(payload_size) + 1;
    let too_large = Error::FrameTooLarge {
        size: declared_size,
        max: max_frame_size,
    };
    if max_frame_size > 0 && declared_size > u64::from(max_frame_size) {
        return Err(too_large);
    }
    let total_size = usize::try_from(declared_size).map_err(|_| too_large)?;

    if src.len() < total_size {
        return Ok(None);
    }

    let end = src[total_size - 1];
    if end != FRAME_END {
        return Err(Error::FrameEndMissing(end));
    }

    let payload = Bytes::copy_from_slice(&src[FRAME_HEADER_SIZE..total_size - 1]);
    let body = match frame_type {
        FRAME_METHOD => FrameBody::Method(Method::decode(payload)?),
        FRAME_HEADER => FrameBody::Header(ContentHeader::decode(payload)?),
        FRAME_BODY => FrameBody::Body(payload),
        _ => match channel {
            0 => FrameBody::Heartbeat,
            _ => return Err(Error::HeartbeatOnChannel(channel)),
        },
    };

    Ok(Some(ReceivedFrame {
        frame: Frame { channel, body },
        total_size,
    }))
}
