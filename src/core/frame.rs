//! # Packet Framing
//!
//! Turns a byte stream into `(packet id, payload)` frames and back, without
//! knowing what any packet means.
//!
//! ## Wire Format
//! ```text
//! [VarInt length] [VarInt packet id] [payload(length - sizeof(VarInt(packet id)))]
//! ```
//!
//! [`FrameCodec`] plugs into `tokio_util::codec::Framed`/`FramedRead`, which take
//! care of partial socket reads. A stream that closes in the middle of a frame
//! yields [`ProtocolError::UnexpectedEof`].

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::core::types::{read_varint, varint_len, write_varint};
use crate::error::{constants, ProtocolError, Result};

/// Maximum frame size (2 MiB, same as vanilla).
pub const MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// One undecoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Packet id exactly as it appeared on the wire.
    pub id: i32,
    /// Bytes following the packet id.
    pub payload: Bytes,
}

impl RawFrame {
    pub fn new(id: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Value of the length prefix this frame is written with.
    pub fn length(&self) -> usize {
        varint_len(self.id) + self.payload.len()
    }
}

/// Append one complete frame to `buf`.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn write_frame(buf: &mut BytesMut, id: i32, payload: &[u8]) {
    let length = varint_len(id) + payload.len();
    buf.reserve(varint_len(length as i32) + length);
    write_varint(buf, length as i32);
    write_varint(buf, id);
    buf.extend_from_slice(payload);
}

/// Try to split one frame off the front of `src`.
///
/// Returns `Ok(None)` and leaves `src` untouched when more bytes are needed.
pub fn decode_frame(src: &mut BytesMut, max_frame_len: usize) -> Result<Option<RawFrame>> {
    let mut peek = &src[..];
    let length = match read_varint(&mut peek) {
        Ok(length) => length,
        Err(ProtocolError::UnexpectedEof(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    let header_len = src.len() - peek.len();

    let length = usize::try_from(length).map_err(|_| ProtocolError::NegativeLength(length))?;
    if length > max_frame_len {
        return Err(ProtocolError::PacketTooLong {
            len: length,
            max: max_frame_len,
        });
    }

    if src.len() < header_len + length {
        src.reserve(header_len + length - src.len());
        return Ok(None);
    }

    src.advance(header_len);
    let mut body = src.split_to(length).freeze();
    let id = read_varint(&mut body).map_err(|e| match e {
        // The id must fit inside the declared length.
        ProtocolError::UnexpectedEof(_) => ProtocolError::UnexpectedEof(constants::EOF_PACKET),
        other => other,
    })?;

    trace!(id, length, "Decoded frame");
    Ok(Some(RawFrame { id, payload: body }))
}

/// Tokio codec for Minecraft frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Decoder for FrameCodec {
    type Item = RawFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        decode_frame(src, self.max_frame_len)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::UnexpectedEof(constants::EOF_PACKET)),
        }
    }
}

impl Encoder<RawFrame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: RawFrame, dst: &mut BytesMut) -> Result<()> {
        if frame.length() > self.max_frame_len {
            return Err(ProtocolError::PacketTooLong {
                len: frame.length(),
                max: self.max_frame_len,
            });
        }
        write_frame(dst, frame.id, &frame.payload);
        Ok(())
    }
}
