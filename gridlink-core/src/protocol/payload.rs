//! Primitive readers and writers for protocol message payloads.
//!
//! All multi-byte integers are little-endian. Strings are a `u32` byte length
//! followed by UTF-8 bytes. UUIDs are 16 bytes, most significant byte first.
//! Socket addresses are a host string followed by an `i32` port.

use std::net::{IpAddr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::{GridError, Result};

/// Builds a message payload.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buffer: BytesMut,
}

impl PayloadWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.buffer.put_u8(v);
        self
    }

    /// Writes a boolean as one byte.
    pub fn write_bool(&mut self, v: bool) -> &mut Self {
        self.write_u8(u8::from(v))
    }

    /// Writes a 32-bit signed integer.
    pub fn write_i32(&mut self, v: i32) -> &mut Self {
        self.buffer.put_i32_le(v);
        self
    }

    /// Writes a 64-bit signed integer.
    pub fn write_i64(&mut self, v: i64) -> &mut Self {
        self.buffer.put_i64_le(v);
        self
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, v: &str) -> &mut Self {
        self.write_bytes(v.as_bytes())
    }

    /// Writes a length-prefixed byte array.
    pub fn write_bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buffer.put_u32_le(v.len() as u32);
        self.buffer.put_slice(v);
        self
    }

    /// Writes an optional string as a presence byte plus the string.
    pub fn write_opt_string(&mut self, v: Option<&str>) -> &mut Self {
        match v {
            Some(s) => self.write_bool(true).write_string(s),
            None => self.write_bool(false),
        }
    }

    /// Writes a UUID as 16 big-endian bytes.
    pub fn write_uuid(&mut self, v: &Uuid) -> &mut Self {
        self.buffer.put_slice(v.as_bytes());
        self
    }

    /// Writes a socket address as host string plus port.
    pub fn write_address(&mut self, v: &SocketAddr) -> &mut Self {
        self.write_string(&v.ip().to_string())
            .write_i32(i32::from(v.port()))
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the writer, returning the payload.
    pub fn finish(self) -> Bytes {
        self.buffer.freeze()
    }
}

/// Reads a message payload written by [`PayloadWriter`].
#[derive(Debug)]
pub struct PayloadReader {
    buffer: Bytes,
}

impl PayloadReader {
    /// Creates a reader over `payload`.
    pub fn new(payload: Bytes) -> Self {
        Self { buffer: payload }
    }

    /// Returns the number of bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.buffer.remaining() < n {
            Err(GridError::Protocol(format!(
                "truncated payload: need {} bytes, have {}",
                n,
                self.buffer.remaining()
            )))
        } else {
            Ok(())
        }
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure_remaining(1)?;
        Ok(self.buffer.get_u8())
    }

    /// Reads a boolean from a single byte.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a 32-bit signed integer.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        Ok(self.buffer.get_i32_le())
    }

    /// Reads a 64-bit signed integer.
    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        Ok(self.buffer.get_i64_le())
    }

    /// Reads an element count, rejecting counts the rest of the payload
    /// cannot hold at `min_element_size` bytes per element.
    pub fn read_count(&mut self, min_element_size: usize) -> Result<usize> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(GridError::Protocol(format!("negative element count {}", count)));
        }
        let count = count as usize;
        let needed = count.saturating_mul(min_element_size.max(1));
        if needed > self.buffer.remaining() {
            return Err(GridError::Protocol(format!(
                "element count {} needs at least {} bytes, have {}",
                count,
                needed,
                self.buffer.remaining()
            )));
        }
        Ok(count)
    }

    /// Reads a length-prefixed byte array without copying.
    pub fn read_bytes(&mut self) -> Result<Bytes> {
        self.ensure_remaining(4)?;
        let len = self.buffer.get_u32_le() as usize;
        self.ensure_remaining(len)?;
        Ok(self.buffer.split_to(len))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let raw = self.read_bytes()?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| GridError::Protocol(format!("invalid UTF-8 string: {}", e)))
    }

    /// Reads an optional string written by [`PayloadWriter::write_opt_string`].
    pub fn read_opt_string(&mut self) -> Result<Option<String>> {
        if self.read_bool()? {
            Ok(Some(self.read_string()?))
        } else {
            Ok(None)
        }
    }

    /// Reads a 16-byte UUID.
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        self.ensure_remaining(16)?;
        let mut raw = [0u8; 16];
        self.buffer.copy_to_slice(&mut raw);
        Ok(Uuid::from_bytes(raw))
    }

    /// Reads a socket address.
    pub fn read_address(&mut self) -> Result<SocketAddr> {
        let host = self.read_string()?;
        let port = self.read_i32()?;
        let ip: IpAddr = host
            .parse()
            .map_err(|_| GridError::Protocol(format!("invalid member host '{}'", host)))?;
        let port = u16::try_from(port)
            .map_err(|_| GridError::Protocol(format!("invalid member port {}", port)))?;
        Ok(SocketAddr::new(ip, port))
    }

    /// Returns the unread remainder of the payload.
    pub fn into_remaining(self) -> Bytes {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_layout() {
        let mut writer = PayloadWriter::new();
        writer.write_string("dev");
        let bytes = writer.finish();
        assert_eq!(bytes.as_ref(), &[3, 0, 0, 0, b'd', b'e', b'v']);
    }

    #[test]
    fn test_uuid_is_big_endian() {
        let uuid = Uuid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff);
        let mut writer = PayloadWriter::new();
        writer.write_uuid(&uuid);
        let bytes = writer.finish();
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[15], 0xff);

        let mut reader = PayloadReader::new(bytes);
        assert_eq!(reader.read_uuid().unwrap(), uuid);
    }

    #[test]
    fn test_mixed_fields() {
        let addr: SocketAddr = "10.0.0.7:5701".parse().unwrap();
        let mut writer = PayloadWriter::new();
        writer
            .write_u8(2)
            .write_i32(-1)
            .write_i64(1 << 40)
            .write_opt_string(None)
            .write_opt_string(Some("token"))
            .write_address(&addr);

        let mut reader = PayloadReader::new(writer.finish());
        assert_eq!(reader.read_u8().unwrap(), 2);
        assert_eq!(reader.read_i32().unwrap(), -1);
        assert_eq!(reader.read_i64().unwrap(), 1 << 40);
        assert_eq!(reader.read_opt_string().unwrap(), None);
        assert_eq!(reader.read_opt_string().unwrap().as_deref(), Some("token"));
        assert_eq!(reader.read_address().unwrap(), addr);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_string_is_protocol_error() {
        let mut raw = BytesMut::new();
        raw.put_u32_le(10);
        raw.put_slice(b"abc");
        let mut reader = PayloadReader::new(raw.freeze());
        assert!(matches!(reader.read_string(), Err(GridError::Protocol(_))));
    }

    #[test]
    fn test_count_larger_than_payload_rejected() {
        let mut writer = PayloadWriter::new();
        writer.write_i32(i32::MAX).write_i32(7);
        let mut reader = PayloadReader::new(writer.finish());
        assert!(matches!(reader.read_count(4), Err(GridError::Protocol(_))));
    }

    #[test]
    fn test_count_within_payload() {
        let mut writer = PayloadWriter::new();
        writer.write_i32(2).write_i32(7).write_i32(8);
        let mut reader = PayloadReader::new(writer.finish());
        assert_eq!(reader.read_count(4).unwrap(), 2);

        let mut writer = PayloadWriter::new();
        writer.write_i32(-3);
        let mut reader = PayloadReader::new(writer.finish());
        assert!(matches!(reader.read_count(4), Err(GridError::Protocol(_))));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut writer = PayloadWriter::new();
        writer.write_string("127.0.0.1").write_i32(70_000);
        let mut reader = PayloadReader::new(writer.finish());
        assert!(reader.read_address().is_err());
    }
}
