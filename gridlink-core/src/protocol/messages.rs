//! Encoders and decoders for the built-in cluster messages.
//!
//! Every type here has an `encode` producing a [`ClientMessage`] and a
//! `decode` parsing one. Both directions are needed: the client sends
//! requests and parses responses, test members do the reverse.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use uuid::Uuid;

use super::constants::*;
use super::payload::{PayloadReader, PayloadWriter};
use super::ClientMessage;
use crate::error::{GridError, Result};

/// Smallest encoded member: uuid, empty host, port, version, lite flag and
/// attribute count.
const MIN_MEMBER_SIZE: usize = 16 + 4 + 4 + 4 + 1 + 4;

/// Two empty strings.
const MIN_ATTRIBUTE_SIZE: usize = 8;

fn expect_type(message: &ClientMessage, expected: i32) -> Result<()> {
    if message.is_error() {
        return Err(ErrorRecord::decode(message)?.into_error());
    }
    if message.message_type() != expected {
        return Err(GridError::Protocol(format!(
            "expected message type {:#08x} ({}), got {:#08x}",
            expected,
            message_type_name(expected),
            message.message_type()
        )));
    }
    Ok(())
}

/// Credentials sent in the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No credentials; the cluster name alone admits the client.
    None,
    /// Username and password.
    UsernamePassword {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },
    /// An opaque token.
    Token(String),
}

impl Credentials {
    const KIND_NONE: u8 = 0;
    const KIND_PASSWORD: u8 = 1;
    const KIND_TOKEN: u8 = 2;

    fn write(&self, writer: &mut PayloadWriter) {
        match self {
            Credentials::None => {
                writer.write_u8(Self::KIND_NONE);
            }
            Credentials::UsernamePassword { username, password } => {
                writer
                    .write_u8(Self::KIND_PASSWORD)
                    .write_string(username)
                    .write_string(password);
            }
            Credentials::Token(token) => {
                writer.write_u8(Self::KIND_TOKEN).write_string(token);
            }
        }
    }

    fn read(reader: &mut PayloadReader) -> Result<Self> {
        match reader.read_u8()? {
            Self::KIND_NONE => Ok(Credentials::None),
            Self::KIND_PASSWORD => Ok(Credentials::UsernamePassword {
                username: reader.read_string()?,
                password: reader.read_string()?,
            }),
            Self::KIND_TOKEN => Ok(Credentials::Token(reader.read_string()?)),
            other => Err(GridError::Protocol(format!(
                "unknown credentials kind {}",
                other
            ))),
        }
    }
}

/// The `AUTHENTICATION` request opening every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    /// Name of the cluster the client wants to join.
    pub cluster_name: String,
    /// Credentials presented to the member.
    pub credentials: Credentials,
    /// Identity of this client instance.
    pub client_uuid: Uuid,
    /// Human-readable client name.
    pub client_name: String,
    /// Serialization version spoken by the client.
    pub serialization_version: u8,
}

impl AuthenticationRequest {
    /// Encodes the request.
    pub fn encode(&self) -> ClientMessage {
        let mut writer = PayloadWriter::with_capacity(64);
        writer.write_string(&self.cluster_name);
        self.credentials.write(&mut writer);
        writer
            .write_uuid(&self.client_uuid)
            .write_string(&self.client_name)
            .write_u8(self.serialization_version);
        ClientMessage::new_request(CLIENT_AUTHENTICATION, writer.finish())
    }

    /// Decodes the request.
    pub fn decode(message: &ClientMessage) -> Result<Self> {
        expect_type(message, CLIENT_AUTHENTICATION)?;
        let mut reader = PayloadReader::new(message.payload().clone());
        Ok(Self {
            cluster_name: reader.read_string()?,
            credentials: Credentials::read(&mut reader)?,
            client_uuid: reader.read_uuid()?,
            client_name: reader.read_string()?,
            serialization_version: reader.read_u8()?,
        })
    }
}

/// Outcome of authentication as reported by the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationStatus {
    /// The client is admitted.
    Authenticated,
    /// Credentials were rejected.
    CredentialsFailed,
    /// Client and member serialization versions differ.
    SerializationVersionMismatch,
    /// The member does not accept this client in its cluster.
    NotAllowedInCluster,
}

impl AuthenticationStatus {
    /// Creates a status from its wire value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            AUTH_STATUS_AUTHENTICATED => Some(Self::Authenticated),
            AUTH_STATUS_CREDENTIALS_FAILED => Some(Self::CredentialsFailed),
            AUTH_STATUS_SERIALIZATION_VERSION_MISMATCH => Some(Self::SerializationVersionMismatch),
            AUTH_STATUS_NOT_ALLOWED_IN_CLUSTER => Some(Self::NotAllowedInCluster),
            _ => None,
        }
    }

    /// Returns the wire value of this status.
    pub fn value(self) -> u8 {
        match self {
            Self::Authenticated => AUTH_STATUS_AUTHENTICATED,
            Self::CredentialsFailed => AUTH_STATUS_CREDENTIALS_FAILED,
            Self::SerializationVersionMismatch => AUTH_STATUS_SERIALIZATION_VERSION_MISMATCH,
            Self::NotAllowedInCluster => AUTH_STATUS_NOT_ALLOWED_IN_CLUSTER,
        }
    }
}

impl std::fmt::Display for AuthenticationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Authenticated => "authenticated",
            Self::CredentialsFailed => "credentials failed",
            Self::SerializationVersionMismatch => "serialization version mismatch",
            Self::NotAllowedInCluster => "not allowed in cluster",
        };
        f.write_str(name)
    }
}

/// The `AUTHENTICATION` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResponse {
    /// Authentication outcome.
    pub status: AuthenticationStatus,
    /// UUID of the member that answered.
    pub member_uuid: Uuid,
    /// Address the member advertises for itself.
    pub member_address: SocketAddr,
    /// Number of partitions in the cluster.
    pub partition_count: i32,
    /// Identifier of the cluster.
    pub cluster_id: Uuid,
    /// Serialization version spoken by the member.
    pub serialization_version: u8,
}

impl AuthenticationResponse {
    /// Encodes the response for the request with `correlation_id`.
    pub fn encode(&self, correlation_id: i64) -> ClientMessage {
        let mut writer = PayloadWriter::with_capacity(64);
        writer
            .write_u8(self.status.value())
            .write_uuid(&self.member_uuid)
            .write_address(&self.member_address)
            .write_i32(self.partition_count)
            .write_uuid(&self.cluster_id)
            .write_u8(self.serialization_version);
        ClientMessage::new_response(
            CLIENT_AUTHENTICATION_RESPONSE,
            correlation_id,
            writer.finish(),
        )
    }

    /// Decodes the response.
    pub fn decode(message: &ClientMessage) -> Result<Self> {
        expect_type(message, CLIENT_AUTHENTICATION_RESPONSE)?;
        let mut reader = PayloadReader::new(message.payload().clone());
        let raw_status = reader.read_u8()?;
        let status = AuthenticationStatus::from_value(raw_status).ok_or_else(|| {
            GridError::Protocol(format!("unknown authentication status {}", raw_status))
        })?;
        Ok(Self {
            status,
            member_uuid: reader.read_uuid()?,
            member_address: reader.read_address()?,
            partition_count: reader.read_i32()?,
            cluster_id: reader.read_uuid()?,
            serialization_version: reader.read_u8()?,
        })
    }

    /// Converts a non-successful status into an authentication error.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            AuthenticationStatus::Authenticated => Ok(self),
            status => Err(GridError::Authentication(format!(
                "member {} rejected the client: {}",
                self.member_address, status
            ))),
        }
    }
}

/// Error record carried by messages flagged `IS_ERROR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Server-side error code.
    pub code: i32,
    /// Server-side error class name.
    pub class_name: String,
    /// Server-side error message.
    pub message: String,
}

impl ErrorRecord {
    /// Creates a new error record.
    pub fn new(code: i32, class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            class_name: class_name.into(),
            message: message.into(),
        }
    }

    /// Encodes the record as an error response for `correlation_id`.
    pub fn encode(&self, correlation_id: i64) -> ClientMessage {
        let mut writer = PayloadWriter::new();
        writer
            .write_i32(self.code)
            .write_string(&self.class_name)
            .write_string(&self.message);
        ClientMessage::new_error(correlation_id, writer.finish())
    }

    /// Decodes a record from an error message.
    pub fn decode(message: &ClientMessage) -> Result<Self> {
        let mut reader = PayloadReader::new(message.payload().clone());
        Ok(Self {
            code: reader.read_i32()?,
            class_name: reader.read_string()?,
            message: reader.read_string()?,
        })
    }

    /// Returns true if the code denotes a transient cluster condition.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ERROR_CODE_INSTANCE_NOT_ACTIVE
                | ERROR_CODE_MEMBER_LEFT
                | ERROR_CODE_PARTITION_MIGRATING
                | ERROR_CODE_RETRYABLE
                | ERROR_CODE_RETRYABLE_IO
                | ERROR_CODE_TARGET_DISCONNECTED
                | ERROR_CODE_TARGET_NOT_MEMBER
                | ERROR_CODE_WRONG_TARGET
        )
    }

    /// Maps the record onto the client error taxonomy.
    ///
    /// Transient codes become retryable `Topology`/`Transport` errors; all
    /// other codes are application errors surfaced verbatim.
    pub fn into_error(self) -> GridError {
        match self.code {
            ERROR_CODE_RETRYABLE_IO | ERROR_CODE_TARGET_DISCONNECTED => GridError::Transport(
                format!("{} (code {}): {}", self.class_name, self.code, self.message),
            ),
            _ if self.is_retryable() => GridError::Topology(format!(
                "{} (code {}): {}",
                self.class_name, self.code, self.message
            )),
            _ => GridError::Application {
                code: self.code,
                class_name: self.class_name,
                message: self.message,
            },
        }
    }
}

/// Member description as carried in cluster views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Unique identifier of the member.
    pub uuid: Uuid,
    /// Address clients connect to.
    pub address: SocketAddr,
    /// Member-list version at which the member joined.
    pub version: i32,
    /// Custom attributes.
    pub attributes: HashMap<String, String>,
    /// Whether the member holds no partitions.
    pub lite_member: bool,
}

impl MemberInfo {
    /// Creates a data member without attributes.
    pub fn new(uuid: Uuid, address: SocketAddr) -> Self {
        Self {
            uuid,
            address,
            version: 0,
            attributes: HashMap::new(),
            lite_member: false,
        }
    }

    fn write(&self, writer: &mut PayloadWriter) {
        writer
            .write_uuid(&self.uuid)
            .write_address(&self.address)
            .write_i32(self.version)
            .write_bool(self.lite_member)
            .write_i32(self.attributes.len() as i32);
        for (key, value) in &self.attributes {
            writer.write_string(key).write_string(value);
        }
    }

    fn read(reader: &mut PayloadReader) -> Result<Self> {
        let uuid = reader.read_uuid()?;
        let address = reader.read_address()?;
        let version = reader.read_i32()?;
        let lite_member = reader.read_bool()?;
        let count = reader.read_count(MIN_ATTRIBUTE_SIZE)?;
        let mut attributes = HashMap::with_capacity(count);
        for _ in 0..count {
            let key = reader.read_string()?;
            let value = reader.read_string()?;
            attributes.insert(key, value);
        }
        Ok(Self {
            uuid,
            address,
            version,
            attributes,
            lite_member,
        })
    }
}

/// A versioned snapshot of members and partition ownership.
///
/// `partition_owners[p]` is the owner of partition `p`, or `None` while
/// unassigned. On the wire owners are indexes into `members`, `-1` for none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterView {
    /// Monotonically increasing view version.
    pub version: i64,
    /// Current members.
    pub members: Vec<MemberInfo>,
    /// Owner per partition.
    pub partition_owners: Vec<Option<Uuid>>,
}

impl ClusterView {
    fn write(&self, writer: &mut PayloadWriter) {
        writer
            .write_i64(self.version)
            .write_i32(self.members.len() as i32);
        for member in &self.members {
            member.write(writer);
        }
        writer.write_i32(self.partition_owners.len() as i32);
        for owner in &self.partition_owners {
            let index = owner
                .and_then(|uuid| self.members.iter().position(|m| m.uuid == uuid))
                .map(|i| i as i32)
                .unwrap_or(-1);
            writer.write_i32(index);
        }
    }

    fn read(payload: Bytes) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);
        let version = reader.read_i64()?;
        let member_count = reader.read_count(MIN_MEMBER_SIZE)?;
        let mut members = Vec::with_capacity(member_count);
        for _ in 0..member_count {
            members.push(MemberInfo::read(&mut reader)?);
        }
        let partition_count = reader.read_count(4)?;
        let mut partition_owners = Vec::with_capacity(partition_count);
        for partition_id in 0..partition_count {
            let index = reader.read_i32()?;
            let owner = if index < 0 {
                None
            } else {
                let member = members.get(index as usize).ok_or_else(|| {
                    GridError::Protocol(format!(
                        "partition {} refers to member index {} of {}",
                        partition_id,
                        index,
                        members.len()
                    ))
                })?;
                Some(member.uuid)
            };
            partition_owners.push(owner);
        }
        Ok(Self {
            version,
            members,
            partition_owners,
        })
    }

    /// Encodes the view as a `CLUSTER_VIEW_EVENT` push.
    pub fn encode_event(&self) -> ClientMessage {
        let mut writer = PayloadWriter::with_capacity(128);
        self.write(&mut writer);
        ClientMessage::new_event(CLUSTER_VIEW_EVENT, writer.finish())
    }

    /// Encodes the view as the response to a `CLUSTER_VIEW_REQUEST`.
    pub fn encode_response(&self, correlation_id: i64) -> ClientMessage {
        let mut writer = PayloadWriter::with_capacity(128);
        self.write(&mut writer);
        ClientMessage::new_response(CLUSTER_VIEW_RESPONSE, correlation_id, writer.finish())
    }

    /// Decodes a view from either a push event or a pull response.
    pub fn decode(message: &ClientMessage) -> Result<Self> {
        if message.message_type() == CLUSTER_VIEW_EVENT {
            return Self::read(message.payload().clone());
        }
        expect_type(message, CLUSTER_VIEW_RESPONSE)?;
        Self::read(message.payload().clone())
    }
}

/// Creates a heartbeat ping.
pub fn ping_request() -> ClientMessage {
    ClientMessage::new_request(CLIENT_PING, Bytes::new())
}

/// Creates the request registering this connection for view pushes.
pub fn cluster_view_listen_request() -> ClientMessage {
    ClientMessage::new_request(CLUSTER_VIEW_LISTEN, Bytes::new())
}

/// Creates a request pulling the current view.
pub fn cluster_view_request() -> ClientMessage {
    ClientMessage::new_request(CLUSTER_VIEW_REQUEST, Bytes::new())
}
