//! RFC 6455 frame encoding and decoding.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               | Masking-key, if MASK set to 1 |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! Only single-frame messages are produced (FIN is always set).
//! [`parse_frame`] reports [`FrameParse::Incomplete`] instead of failing when
//! the buffer ends early, so the caller can keep its bytes and retry after
//! the next read.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProbeResult, WsError};

/// Largest payload carried with the inline 7-bit length.
pub const MAX_INLINE_LEN: usize = 125;

/// Largest payload carried with the 16-bit extended length.
pub const MAX_U16_LEN: usize = 65_535;

/// Largest payload [`parse_frame`] accepts; a bigger declared length is a
/// protocol error.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LEN_MARKER_U16: u8 = 126;
const LEN_MARKER_U64: u8 = 127;
const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;

/// WebSocket opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// Close, ping and pong.
    pub fn is_control(&self) -> bool {
        (*self as u8) >= 0x8
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub masked: bool,
    /// Present iff `masked`.
    pub masking_key: Option<[u8; 4]>,
    /// Payload with the mask already removed.
    pub payload: Bytes,
    /// Total bytes this frame occupied in the buffer.
    pub frame_length: usize,
}

/// Result of trying to decode one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameParse {
    /// More bytes are needed; nothing was consumed.
    Incomplete,
    Complete(Frame),
}

/// Encode a single FIN frame, masking with a fresh random key if `mask`.
pub fn create_frame(payload: &[u8], opcode: OpCode, mask: bool) -> Bytes {
    let key = if mask { Some(generate_mask()) } else { None };
    encode_frame(payload, opcode, key)
}

/// Encode a single FIN frame with an explicit masking key.
pub fn encode_frame(payload: &[u8], opcode: OpCode, masking_key: Option<[u8; 4]>) -> Bytes {
    let len = payload.len();
    let mut buf = BytesMut::with_capacity(len + 14);

    buf.put_u8(FIN_BIT | opcode as u8);

    let mask_bit = if masking_key.is_some() { MASK_BIT } else { 0 };
    if len <= MAX_INLINE_LEN {
        buf.put_u8(mask_bit | len as u8);
    } else if len <= MAX_U16_LEN {
        buf.put_u8(mask_bit | LEN_MARKER_U16);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(mask_bit | LEN_MARKER_U64);
        buf.put_u64(len as u64);
    }

    match masking_key {
        Some(key) => {
            buf.put_slice(&key);
            let start = buf.len();
            buf.put_slice(payload);
            apply_mask(&mut buf[start..], key);
        }
        None => buf.put_slice(payload),
    }

    buf.freeze()
}

/// Decode one frame from the front of `buf`.
///
/// Never looks past the first frame and never mutates `buf`.
pub fn parse_frame(buf: &[u8]) -> ProbeResult<FrameParse> {
    if buf.len() < 2 {
        return Ok(FrameParse::Incomplete);
    }

    let fin = buf[0] & FIN_BIT != 0;
    let opcode = OpCode::from_u8(buf[0] & 0x0F).ok_or_else(|| {
        WsError::Protocol(format!("unknown opcode 0x{:X}", buf[0] & 0x0F))
    })?;
    let masked = buf[1] & MASK_BIT != 0;

    let (payload_len, mut offset) = match buf[1] & 0x7F {
        LEN_MARKER_U16 => {
            if buf.len() < 4 {
                return Ok(FrameParse::Incomplete);
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
        }
        LEN_MARKER_U64 => {
            if buf.len() < 10 {
                return Ok(FrameParse::Incomplete);
            }
            let mut len_bytes = [0u8; 8];
            len_bytes.copy_from_slice(&buf[2..10]);
            let len = u64::from_be_bytes(len_bytes);
            if len & (1 << 63) != 0 {
                return Err(WsError::Protocol("64-bit payload length has MSB set".into()).into());
            }
            (len, 10)
        }
        inline => (inline as u64, 2),
    };

    let masking_key = if masked {
        if buf.len() < offset + 4 {
            return Ok(FrameParse::Incomplete);
        }
        let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        offset += 4;
        Some(key)
    } else {
        None
    };

    let payload_len = match usize::try_from(payload_len) {
        Ok(len) if len <= MAX_FRAME_LEN => len,
        _ => {
            return Err(WsError::Protocol(format!(
                "payload length {} exceeds {} bytes",
                payload_len, MAX_FRAME_LEN
            ))
            .into())
        }
    };
    let frame_length = offset
        .checked_add(payload_len)
        .ok_or_else(|| WsError::Protocol("payload length overflows".into()))?;
    if buf.len() < frame_length {
        return Ok(FrameParse::Incomplete);
    }

    let mut payload = BytesMut::from(&buf[offset..frame_length]);
    if let Some(key) = masking_key {
        apply_mask(&mut payload, key);
    }

    Ok(FrameParse::Complete(Frame {
        fin,
        opcode,
        masked,
        masking_key,
        payload: payload.freeze(),
        frame_length,
    }))
}

/// XOR `data` with `key[i % 4]`, in place. Applying it twice is a no-op.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Random 4-byte masking key.
pub fn generate_mask() -> [u8; 4] {
    rand::random()
}

/// CLOSE payload: 2-byte big-endian code followed by the UTF-8 reason.
pub fn close_payload(code: u16, reason: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());
    payload
}

/// Split a CLOSE payload into code and reason. An empty payload has no code.
pub fn parse_close_payload(payload: &[u8]) -> (Option<u16>, String) {
    if payload.len() < 2 {
        return (None, String::new());
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    (Some(code), String::from_utf8_lossy(&payload[2..]).into_owned())
}
