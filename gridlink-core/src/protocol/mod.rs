//! gridlink wire protocol.
//!
//! Every message is a single frame: a fixed little-endian header followed by
//! an opaque payload. See [`FrameHeader`] for the exact layout.

mod client_message;
mod codec;
pub mod constants;
mod frame;
pub mod messages;
mod payload;

pub use client_message::ClientMessage;
pub use codec::ClientMessageCodec;
pub use constants::*;
pub use frame::FrameHeader;
pub use messages::{
    AuthenticationRequest, AuthenticationResponse, AuthenticationStatus, ClusterView,
    Credentials, ErrorRecord, MemberInfo,
};
pub use payload::{PayloadReader, PayloadWriter};
