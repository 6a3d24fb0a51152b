//! Protocol constants for the gridlink wire protocol.

/// Protocol preamble written once by the client after the socket opens.
pub const PROTOCOL_PREAMBLE: &[u8; 3] = b"CP2";

/// Size of the frame length field in bytes.
pub const SIZE_OF_FRAME_LENGTH_FIELD: usize = 4;

/// Size of the fixed header following the length field:
/// correlation id (8) + message type (4) + flags (2) + partition id (4).
pub const HEADER_SIZE: usize = 8 + 4 + 2 + 4;

/// Total fixed bytes of every frame on the wire (length + header).
pub const FRAME_HEADER_SIZE: usize = SIZE_OF_FRAME_LENGTH_FIELD + HEADER_SIZE;

/// Default upper bound for a single frame, including its length field.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Event flag - the frame is an unsolicited push from the member.
pub const IS_EVENT_FLAG: u16 = 1 << 0;

/// Error flag - the payload is an error record.
pub const IS_ERROR_FLAG: u16 = 1 << 1;

/// Default frame flags (no special flags set).
pub const DEFAULT_FLAGS: u16 = 0;

/// Partition ID indicating no specific partition (-1).
pub const PARTITION_ID_ANY: i32 = -1;

/// Correlation id reserved for heartbeat pings; never handed to invocations.
pub const HEARTBEAT_CORRELATION_ID: i64 = 0;

/// Serialization version announced in the handshake.
pub const SERIALIZATION_VERSION: u8 = 1;

// Message types.

/// Error response.
pub const ERROR_MESSAGE: i32 = 0x000000;

/// Client authentication request.
pub const CLIENT_AUTHENTICATION: i32 = 0x000100;

/// Client authentication response.
pub const CLIENT_AUTHENTICATION_RESPONSE: i32 = 0x000101;

/// Cluster view listener registration request.
pub const CLUSTER_VIEW_LISTEN: i32 = 0x000300;

/// Cluster view listener registration response.
pub const CLUSTER_VIEW_LISTEN_RESPONSE: i32 = 0x000301;

/// Cluster view push event.
pub const CLUSTER_VIEW_EVENT: i32 = 0x000302;

/// Cluster view pull request.
pub const CLUSTER_VIEW_REQUEST: i32 = 0x000310;

/// Cluster view pull response.
pub const CLUSTER_VIEW_RESPONSE: i32 = 0x000311;

/// Heartbeat ping request.
pub const CLIENT_PING: i32 = 0x000B00;

/// Heartbeat ping response.
pub const CLIENT_PING_RESPONSE: i32 = 0x000B01;

// Authentication status codes.

/// Authentication succeeded.
pub const AUTH_STATUS_AUTHENTICATED: u8 = 0;

/// Credentials were rejected.
pub const AUTH_STATUS_CREDENTIALS_FAILED: u8 = 1;

/// Serialization versions of client and member differ.
pub const AUTH_STATUS_SERIALIZATION_VERSION_MISMATCH: u8 = 2;

/// The member refuses clients of this cluster name or client type.
pub const AUTH_STATUS_NOT_ALLOWED_IN_CLUSTER: u8 = 3;

// Server error codes that indicate a transient topology or transport condition.

/// The member is shutting down or not yet started.
pub const ERROR_CODE_INSTANCE_NOT_ACTIVE: i32 = 21;

/// The member owning the data left the cluster.
pub const ERROR_CODE_MEMBER_LEFT: i32 = 35;

/// The partition is being migrated.
pub const ERROR_CODE_PARTITION_MIGRATING: i32 = 39;

/// Generic retryable server condition.
pub const ERROR_CODE_RETRYABLE: i32 = 47;

/// Retryable I/O condition on the member side.
pub const ERROR_CODE_RETRYABLE_IO: i32 = 48;

/// The member lost its connection to the operation target.
pub const ERROR_CODE_TARGET_DISCONNECTED: i32 = 54;

/// The target is not a cluster member.
pub const ERROR_CODE_TARGET_NOT_MEMBER: i32 = 55;

/// The request reached a member that does not own the partition.
pub const ERROR_CODE_WRONG_TARGET: i32 = 71;

/// Returns a readable name for a message type, for logs.
pub fn message_type_name(message_type: i32) -> &'static str {
    match message_type {
        ERROR_MESSAGE => "error",
        CLIENT_AUTHENTICATION => "authentication",
        CLIENT_AUTHENTICATION_RESPONSE => "authentication_response",
        CLUSTER_VIEW_LISTEN => "cluster_view_listen",
        CLUSTER_VIEW_LISTEN_RESPONSE => "cluster_view_listen_response",
        CLUSTER_VIEW_EVENT => "cluster_view_event",
        CLUSTER_VIEW_REQUEST => "cluster_view_request",
        CLUSTER_VIEW_RESPONSE => "cluster_view_response",
        CLIENT_PING => "ping",
        CLIENT_PING_RESPONSE => "ping_response",
        _ => "user",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes() {
        assert_eq!(HEADER_SIZE, 18);
        assert_eq!(FRAME_HEADER_SIZE, 22);
    }

    #[test]
    fn test_flags_are_distinct() {
        assert_eq!(IS_EVENT_FLAG & IS_ERROR_FLAG, 0);
    }

    #[test]
    fn test_message_type_names() {
        assert_eq!(message_type_name(CLIENT_PING), "ping");
        assert_eq!(message_type_name(CLUSTER_VIEW_EVENT), "cluster_view_event");
        assert_eq!(message_type_name(0x010100), "user");
    }
}
