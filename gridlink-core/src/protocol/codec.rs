//! Codec implementation for encoding/decoding gridlink protocol frames.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::constants::*;
use super::frame::{peek_frame_length, FrameHeader};
use super::ClientMessage;
use crate::error::{GridError, Result};

/// Codec for encoding and decoding client messages.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits for use
/// with tokio's framed I/O. Frames whose total size exceeds `max_frame_size`
/// are rejected in both directions.
#[derive(Debug, Clone)]
pub struct ClientMessageCodec {
    max_frame_size: usize,
}

impl ClientMessageCodec {
    /// Creates a codec with the default frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a codec rejecting frames larger than `max_frame_size` bytes.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Returns the configured frame size limit.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for ClientMessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<ClientMessage> for ClientMessageCodec {
    type Error = GridError;

    fn encode(&mut self, item: ClientMessage, dst: &mut BytesMut) -> Result<()> {
        let size = item.wire_size();
        if size > self.max_frame_size {
            return Err(GridError::Protocol(format!(
                "outbound frame of {} bytes exceeds limit of {} bytes",
                size, self.max_frame_size
            )));
        }
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for ClientMessageCodec {
    type Item = ClientMessage;
    type Error = GridError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let frame_length = match peek_frame_length(src) {
            Some(len) => len,
            None => return Ok(None),
        };

        if frame_length < HEADER_SIZE {
            return Err(GridError::Protocol(format!(
                "frame length {} is smaller than the {} byte header",
                frame_length, HEADER_SIZE
            )));
        }

        let total_frame_size = SIZE_OF_FRAME_LENGTH_FIELD + frame_length;
        if total_frame_size > self.max_frame_size {
            return Err(GridError::Protocol(format!(
                "inbound frame of {} bytes exceeds limit of {} bytes",
                total_frame_size, self.max_frame_size
            )));
        }

        if src.len() < total_frame_size {
            src.reserve(total_frame_size - src.len());
            return Ok(None);
        }

        src.advance(SIZE_OF_FRAME_LENGTH_FIELD);
        let header = FrameHeader::read_from(src)
            .ok_or_else(|| GridError::Protocol("failed to read frame header".to_string()))?;
        let payload = src.split_to(frame_length - HEADER_SIZE).freeze();

        Ok(Some(ClientMessage::from_parts(header, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes};

    #[test]
    fn test_encode_decode_request() {
        let mut codec = ClientMessageCodec::new();
        let mut original = ClientMessage::new_partition_request(0x010100, 7, &b"my-key"[..]);
        original.set_correlation_id(11);

        let mut buf = BytesMut::new();
        codec.encode(original.clone(), &mut buf).unwrap();
        assert_eq!(buf.len(), original.wire_size());

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_length() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::from(&[0x01, 0x02][..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_incomplete_frame() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32_le((HEADER_SIZE + 10) as u32);
        buf.put_slice(&[0u8; 6]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_decode_rejects_undersized_length() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32_le(4);
        buf.put_slice(&[0u8; 4]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, GridError::Protocol(_)));
    }

    #[test]
    fn test_decode_rejects_oversized_frame_before_buffering() {
        let mut codec = ClientMessageCodec::with_max_frame_size(64);
        let mut buf = BytesMut::new();
        buf.put_u32_le(1_000);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, GridError::Protocol(_)));
    }

    #[test]
    fn test_encode_rejects_oversized_frame() {
        let mut codec = ClientMessageCodec::with_max_frame_size(FRAME_HEADER_SIZE + 2);
        let msg = ClientMessage::new_request(0x010100, Bytes::from(vec![0u8; 3]));
        let mut buf = BytesMut::new();

        assert!(matches!(
            codec.encode(msg, &mut buf),
            Err(GridError::Protocol(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_multiple_messages() {
        let mut codec = ClientMessageCodec::new();
        let msg1 = ClientMessage::new_response(CLIENT_PING_RESPONSE, 1, Bytes::new());
        let msg2 = ClientMessage::new_event(CLUSTER_VIEW_EVENT, &b"view"[..]);

        let mut buf = BytesMut::new();
        codec.encode(msg1, &mut buf).unwrap();
        codec.encode(msg2, &mut buf).unwrap();

        let decoded1 = codec.decode(&mut buf).unwrap().unwrap();
        let decoded2 = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded1.correlation_id(), 1);
        assert!(decoded2.is_event());
        assert_eq!(decoded2.payload().as_ref(), b"view");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_then_complete_decode() {
        let mut codec = ClientMessageCodec::new();
        let msg = ClientMessage::new_request(CLUSTER_VIEW_REQUEST, &b"abcdef"[..]);

        let mut full_buf = BytesMut::new();
        codec.encode(msg, &mut full_buf).unwrap();

        let split_point = full_buf.len() / 2;
        let mut partial_buf = full_buf.split_to(split_point);
        assert!(codec.decode(&mut partial_buf).unwrap().is_none());

        partial_buf.unsplit(full_buf);
        let decoded = codec.decode(&mut partial_buf).unwrap().unwrap();
        assert_eq!(decoded.message_type(), CLUSTER_VIEW_REQUEST);
    }
}
