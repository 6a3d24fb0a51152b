//! ClientMessage: one frame header plus an opaque payload.

use bytes::{Bytes, BytesMut};

use super::constants::*;
use super::frame::FrameHeader;

/// A single protocol message.
///
/// The header carries routing and matching information; the payload is
/// opaque to the transport and interpreted by the message codecs or by the
/// caller's payload codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    header: FrameHeader,
    payload: Bytes,
}

impl ClientMessage {
    /// Creates a request of the given type targeting any partition.
    ///
    /// The correlation id is assigned by the invocation layer before sending.
    pub fn new_request(message_type: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            header: FrameHeader::new(message_type, HEARTBEAT_CORRELATION_ID),
            payload: payload.into(),
        }
    }

    /// Creates a request for a specific partition.
    pub fn new_partition_request(
        message_type: i32,
        partition_id: i32,
        payload: impl Into<Bytes>,
    ) -> Self {
        let mut msg = Self::new_request(message_type, payload);
        msg.header.partition_id = partition_id;
        msg
    }

    /// Creates a response to the request with `correlation_id`.
    pub fn new_response(message_type: i32, correlation_id: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            header: FrameHeader::new(message_type, correlation_id),
            payload: payload.into(),
        }
    }

    /// Creates an unsolicited event message.
    pub fn new_event(message_type: i32, payload: impl Into<Bytes>) -> Self {
        let mut header = FrameHeader::new(message_type, HEARTBEAT_CORRELATION_ID);
        header.flags |= IS_EVENT_FLAG;
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// Creates an error response whose payload is an encoded error record.
    pub fn new_error(correlation_id: i64, payload: impl Into<Bytes>) -> Self {
        let mut header = FrameHeader::new(ERROR_MESSAGE, correlation_id);
        header.flags |= IS_ERROR_FLAG;
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// Assembles a message from a decoded header and payload.
    pub fn from_parts(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Returns the frame header.
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Returns the message type.
    pub fn message_type(&self) -> i32 {
        self.header.message_type
    }

    /// Returns the correlation id.
    pub fn correlation_id(&self) -> i64 {
        self.header.correlation_id
    }

    /// Sets the correlation id.
    pub fn set_correlation_id(&mut self, correlation_id: i64) {
        self.header.correlation_id = correlation_id;
    }

    /// Returns the partition id.
    pub fn partition_id(&self) -> i32 {
        self.header.partition_id
    }

    /// Sets the partition id.
    pub fn set_partition_id(&mut self, partition_id: i32) {
        self.header.partition_id = partition_id;
    }

    /// Returns the frame flags.
    pub fn flags(&self) -> u16 {
        self.header.flags
    }

    /// Returns true if this message is flagged as an event.
    pub fn is_event(&self) -> bool {
        self.header.is_event()
    }

    /// Returns true if the payload is an error record.
    pub fn is_error(&self) -> bool {
        self.header.is_error()
    }

    /// Returns the payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the message, returning the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Calculates the total size of the message on the wire.
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Writes the whole frame to the destination buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        self.header.write_to(self.payload.len(), dst);
        dst.extend_from_slice(&self.payload);
    }
}
