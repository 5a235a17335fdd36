//! Serialized outbound frames

use std::collections::VecDeque;

use amqp091_types::{
    constants::{FRAME_END, FRAME_HEADER_SIZE},
    Frame,
};
use bytes::{BufMut, Bytes, BytesMut};

/// Bytes of a single send operation
#[derive(Debug)]
pub(crate) struct OutBuffer {
    buf: BytesMut,
}

impl OutBuffer {
    pub(crate) fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(FRAME_HEADER_SIZE + 1),
        }
    }

    /// Encodes the frame followed by its terminator, if it takes one
    pub(crate) fn fill(&mut self, frame: &Frame) -> Result<(), amqp091_types::Error> {
        frame.encode(&mut self.buf)?;
        if frame.needs_terminator() {
            self.buf.put_u8(FRAME_END);
        }
        Ok(())
    }

    pub(crate) fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub(crate) fn from_frame(frame: &Frame) -> Result<Bytes, amqp091_types::Error> {
        let mut buffer = Self::new();
        buffer.fill(frame)?;
        Ok(buffer.freeze())
    }
}

/// Frames held back until the connection is established, tagged with the
/// channel they were sent on
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    frames: VecDeque<(u16, Bytes)>,
}

impl OutboundQueue {
    pub(crate) fn push(&mut self, channel: u16, frame: Bytes) {
        self.frames.push_back((channel, frame));
    }

    pub(crate) fn pop(&mut self) -> Option<Bytes> {
        self.frames.pop_front().map(|(_, frame)| frame)
    }

    /// Drops every frame queued on `channel`
    pub(crate) fn discard(&mut self, channel: u16) {
        self.frames.retain(|(queued, _)| *queued != channel);
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
