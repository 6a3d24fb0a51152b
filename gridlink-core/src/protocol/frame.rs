//! Fixed frame header of the gridlink wire protocol.

use bytes::{Buf, BufMut, BytesMut};

use super::constants::*;

/// The fixed header that follows the length field of every frame.
///
/// On the wire (little-endian):
/// - `u32` length of everything after the length field
/// - `i64` correlation id
/// - `i32` message type
/// - `u16` flags
/// - `i32` partition id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Correlation id used to match responses to requests.
    pub correlation_id: i64,
    /// Message type identifier.
    pub message_type: i32,
    /// Frame flags (`IS_EVENT_FLAG`, `IS_ERROR_FLAG`).
    pub flags: u16,
    /// Target partition, or `PARTITION_ID_ANY`.
    pub partition_id: i32,
}

impl FrameHeader {
    /// Creates a header with default flags and no partition.
    pub fn new(message_type: i32, correlation_id: i64) -> Self {
        Self {
            correlation_id,
            message_type,
            flags: DEFAULT_FLAGS,
            partition_id: PARTITION_ID_ANY,
        }
    }

    /// Returns true if the EVENT flag is set.
    pub fn is_event(&self) -> bool {
        self.flags & IS_EVENT_FLAG != 0
    }

    /// Returns true if the ERROR flag is set.
    pub fn is_error(&self) -> bool {
        self.flags & IS_ERROR_FLAG != 0
    }

    /// Returns the value written in the length field for a payload of `payload_len` bytes.
    pub fn frame_length(payload_len: usize) -> usize {
        HEADER_SIZE + payload_len
    }

    /// Writes the length field and this header to `dst`.
    pub fn write_to(&self, payload_len: usize, dst: &mut BytesMut) {
        dst.reserve(FRAME_HEADER_SIZE);
        dst.put_u32_le(Self::frame_length(payload_len) as u32);
        dst.put_i64_le(self.correlation_id);
        dst.put_i32_le(self.message_type);
        dst.put_u16_le(self.flags);
        dst.put_i32_le(self.partition_id);
    }

    /// Reads a header from `src`, which must be positioned after the length field
    /// and hold at least `HEADER_SIZE` bytes.
    pub fn read_from(src: &mut impl Buf) -> Option<Self> {
        if src.remaining() < HEADER_SIZE {
            return None;
        }
        let correlation_id = src.get_i64_le();
        let message_type = src.get_i32_le();
        let flags = src.get_u16_le();
        let partition_id = src.get_i32_le();
        Some(Self {
            correlation_id,
            message_type,
            flags,
            partition_id,
        })
    }
}

/// Peeks the length field at the front of `src` without consuming it.
pub fn peek_frame_length(src: &[u8]) -> Option<usize> {
    if src.len() < SIZE_OF_FRAME_LENGTH_FIELD {
        return None;
    }
    Some(u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize)
}
