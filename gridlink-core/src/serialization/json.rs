//! JSON payload support.

use std::fmt;

#[cfg(feature = "json")]
use std::marker::PhantomData;

use bytes::Bytes;

use super::PayloadCodec;
use crate::error::{GridError, Result};

/// Format id of JSON payloads.
pub const JSON_FORMAT_ID: i32 = -130;

/// A JSON document held as text.
///
/// Lets callers store and fetch documents without a Rust type for them.
/// The text is not validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsonValue {
    json: String,
}

impl JsonValue {
    /// Creates a new `JsonValue` from a JSON string.
    pub fn from_string(json: impl Into<String>) -> Self {
        Self { json: json.into() }
    }

    /// Returns the JSON string as a reference.
    pub fn as_str(&self) -> &str {
        &self.json
    }

    /// Consumes the wrapper and returns the inner JSON string.
    pub fn into_string(self) -> String {
        self.json
    }
}

#[cfg(feature = "json")]
impl JsonValue {
    /// Creates a new `JsonValue` from a serde_json `Value`.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let json =
            serde_json::to_string(value).map_err(|e| GridError::Serialization(e.to_string()))?;
        Ok(Self { json })
    }

    /// Parses the JSON string into a serde_json `Value`.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.json).map_err(|e| GridError::Serialization(e.to_string()))
    }
}

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.json)
    }
}

impl From<String> for JsonValue {
    fn from(json: String) -> Self {
        Self::from_string(json)
    }
}

impl From<&str> for JsonValue {
    fn from(json: &str) -> Self {
        Self::from_string(json)
    }
}

/// Encodes any serde type as a JSON payload.
#[cfg(feature = "json")]
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

#[cfg(feature = "json")]
impl<T> JsonCodec<T> {
    /// Creates a JSON codec for `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

#[cfg(feature = "json")]
impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "json")]
impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec").finish()
    }
}

#[cfg(feature = "json")]
impl<T> PayloadCodec<T> for JsonCodec<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    fn format_id(&self) -> i32 {
        JSON_FORMAT_ID
    }

    fn encode(&self, value: &T) -> Result<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| GridError::Serialization(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<T> {
        serde_json::from_slice(payload).map_err(|e| GridError::Serialization(e.to_string()))
    }
}

/// Carries [`JsonValue`] documents as their UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTextCodec;

impl PayloadCodec<JsonValue> for JsonTextCodec {
    fn format_id(&self) -> i32 {
        JSON_FORMAT_ID
    }

    fn encode(&self, value: &JsonValue) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(value.as_str().as_bytes()))
    }

    fn decode(&self, payload: &[u8]) -> Result<JsonValue> {
        std::str::from_utf8(payload)
            .map(JsonValue::from)
            .map_err(|e| GridError::Serialization(e.to_string()))
    }
}
