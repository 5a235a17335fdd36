//! `tokio_util` encoder and decoder of AMQP frames

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    constants::{FRAME_END, FRAME_MIN_SIZE},
    frame::{self, Frame, ReceivedFrame},
    Error,
};

/// Encoder and Decoder of AMQP frames
///
/// Wraps [`frame::decode`] and [`Frame::encode`] for integrations that drive
/// the transport through `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: u32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(FRAME_MIN_SIZE)
    }
}

impl FrameCodec {
    /// Creates a codec accepting frames of at most `max_frame_size` bytes,
    /// 0 meaning no limit
    pub fn new(max_frame_size: u32) -> Self {
        Self { max_frame_size }
    }

    /// Maximum frame size currently accepted
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Updates the maximum frame size after tuning
    pub fn set_max_frame_size(&mut self, max_frame_size: u32) -> &mut Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst)?;
        if item.needs_terminator() {
            dst.put_u8(FRAME_END);
        }
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match frame::decode(&src[..], self.max_frame_size)? {
            Some(ReceivedFrame { frame, total_size }) => {
                src.advance(total_size);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}
