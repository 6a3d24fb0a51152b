//! Core types and protocols for gridlink.
//!
//! This crate holds everything that does not touch the network: the error
//! taxonomy, the wire protocol, the partitioning contract and the payload
//! codec boundary.

#![warn(missing_docs)]

pub mod error;
pub mod partition;
pub mod protocol;
pub mod serialization;

pub use error::{GridError, Result};
pub use partition::{partition_id_for, PartitionAware, DEFAULT_PARTITION_COUNT};
pub use protocol::{ClientMessage, ClientMessageCodec};
pub use serialization::{JsonValue, PayloadCodec, RawCodec, Utf8Codec};

#[cfg(feature = "json")]
pub use serialization::JsonCodec;
