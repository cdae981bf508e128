use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: magic (2) + length (4) + opcode (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "SP" (0x53 0x50).
pub const MAGIC: [u8; 2] = [0x53, 0x50];

/// Default maximum payload size: 16 MiB, enough for any single song chunk.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One message on the worker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message kind, interpreted by the service layer.
    pub opcode: u16,
    /// Message body.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// A frame with no body.
    pub fn empty(opcode: u16) -> Self {
        Self::new(opcode, Bytes::new())
    }

    /// Header plus payload length on the wire.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Append one encoded frame to `dst`.
///
/// ```text
/// ┌────────────┬────────────┬────────────┬──────────────────┐
/// │ Magic (2B) │ Length     │ Opcode     │ Payload          │
/// │ "SP"       │ (4B LE)    │ (2B LE)    │ (Length bytes)   │
/// └────────────┴────────────┴────────────┴──────────────────┘
/// ```
pub fn encode_frame(opcode: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u16_le(opcode);
    dst.put_slice(payload);
    Ok(())
}

/// Take one complete frame off the front of `src`.
///
/// Returns `Ok(None)` while the buffer holds less than a full frame; nothing
/// is consumed in that case.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    let opcode = u16::from_le_bytes([src[6], src[7]]);

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { opcode, payload }))
}

/// Limits and timeouts applied by [`FrameReader`](crate::FrameReader) and
/// [`FrameWriter`](crate::FrameWriter).
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest accepted payload in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Per-read timeout on the underlying stream.
    pub read_timeout: Option<Duration>,
    /// Per-write timeout on the underlying stream.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
