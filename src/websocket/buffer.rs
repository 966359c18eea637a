//! Accumulation buffer for inbound frames.

use bytes::{Buf, BytesMut};

use crate::error::ProbeResult;
use crate::websocket::frame::{parse_frame, Frame, FrameParse};

/// Append-only byte buffer; decoded frames are sliced off the front.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with bytes that arrived before the session opened.
    pub fn with_leftover(leftover: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(leftover),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Direct access for socket reads.
    pub fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Decode and remove the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> ProbeResult<Option<Frame>> {
        match parse_frame(&self.buf)? {
            FrameParse::Complete(frame) => {
                self.buf.advance(frame.frame_length);
                Ok(Some(frame))
            }
            FrameParse::Incomplete => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
