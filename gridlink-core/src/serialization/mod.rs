//! Payload codec boundary.
//!
//! The transport never interprets payloads. Callers pick a [`PayloadCodec`]
//! that turns their values into bytes and back; the bytes travel unprefixed.

mod json;

use bytes::Bytes;

use crate::error::{GridError, Result};

#[cfg(feature = "json")]
pub use json::JsonCodec;
pub use json::{JsonTextCodec, JsonValue, JSON_FORMAT_ID};

/// Format id of [`RawCodec`].
pub const RAW_FORMAT_ID: i32 = -1;

/// Format id of [`Utf8Codec`].
pub const UTF8_FORMAT_ID: i32 = -11;

/// Converts values of type `T` to and from opaque payload bytes.
pub trait PayloadCodec<T>: Send + Sync {
    /// Identifier of the payload format, for logs and diagnostics.
    fn format_id(&self) -> i32;

    /// Encodes a value into payload bytes.
    fn encode(&self, value: &T) -> Result<Bytes>;

    /// Decodes payload bytes into a value.
    fn decode(&self, payload: &[u8]) -> Result<T>;
}

/// Pass-through codec for callers that already hold encoded bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl PayloadCodec<Bytes> for RawCodec {
    fn format_id(&self) -> i32 {
        RAW_FORMAT_ID
    }

    fn encode(&self, value: &Bytes) -> Result<Bytes> {
        Ok(value.clone())
    }

    fn decode(&self, payload: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(payload))
    }
}

impl PayloadCodec<Vec<u8>> for RawCodec {
    fn format_id(&self) -> i32 {
        RAW_FORMAT_ID
    }

    fn encode(&self, value: &Vec<u8>) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(value))
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }
}

/// Plain UTF-8 text codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl PayloadCodec<String> for Utf8Codec {
    fn format_id(&self) -> i32 {
        UTF8_FORMAT_ID
    }

    fn encode(&self, value: &String) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(value.as_bytes()))
    }

    fn decode(&self, payload: &[u8]) -> Result<String> {
        String::from_utf8(payload.to_vec())
            .map_err(|e| GridError::Serialization(format!("invalid UTF-8 payload: {}", e)))
    }
}
